//! Terminal webtask invocation.

use crate::context::RequestContext;
use crate::module::{Callable, Export, Webtask};
use crate::types::ResponseSink;
use http::StatusCode;
use webtask_core::{WebtaskError, WebtaskResult};

/// Compiles the request's script and runs its default export.
///
/// Callback and context webtasks have their result sent as JSON with a 200
/// status. Raw webtasks must write the response themselves.
pub(crate) async fn invoke(ctx: &mut RequestContext, sink: &mut ResponseSink) -> WebtaskResult<()> {
    let module = ctx
        .compiler()
        .compile_script()
        .await
        .map_err(|e| WebtaskError::resolution_with_source("failed to compile the webtask", e))?;

    let webtask = match module.default_export() {
        Some(Export::Callable(Callable::Webtask(webtask))) => webtask.clone(),
        Some(Export::Callable(Callable::Middleware(middleware))) => Webtask::Raw(middleware.clone()),
        Some(Export::Callable(other)) => {
            return Err(WebtaskError::contract_violation(format!(
                "the webtask's default export is a {}, not a function",
                other.shape()
            )));
        }
        Some(Export::Factory(_)) => {
            return Err(WebtaskError::contract_violation(
                "the webtask's default export is a factory, not a webtask",
            ));
        }
        None => {
            return Err(WebtaskError::contract_violation(
                "the webtask has no default export",
            ));
        }
    };

    tracing::debug!(
        request_id = %ctx.request_id(),
        convention = webtask.convention(),
        "Invoking webtask"
    );

    match webtask {
        Webtask::Callback(f) => {
            let value = f().await?;
            sink.send_json(StatusCode::OK, &value)
        }
        Webtask::WithContext(f) => {
            let value = f(ctx.snapshot()).await?;
            sink.send_json(StatusCode::OK, &value)
        }
        Webtask::Raw(middleware) => {
            middleware.handle(ctx, sink).await?;
            if sink.is_sent() {
                Ok(())
            } else {
                Err(WebtaskError::contract_violation(
                    "the webtask finished without sending a response",
                ))
            }
        }
    }
}
