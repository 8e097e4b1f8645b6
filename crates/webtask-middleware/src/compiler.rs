//! Script compilation seam.
//!
//! Turning source text into a [`Module`] is sandbox specific, so the engine
//! only sees the [`Compiler`] trait. The request context carries a
//! [`CompilerHandle`]: the compiler currently in effect plus the webtask
//! script. Any step may swap either before later steps or the terminal
//! webtask use them.

use crate::middleware::BoxFuture;
use crate::module::Module;
use std::fmt;
use std::sync::Arc;
use webtask_core::{WebtaskError, WebtaskResult};

/// Compiles source text into a module.
pub trait Compiler: Send + Sync + 'static {
    /// Returns the name of this compiler, used for logging.
    fn name(&self) -> &'static str;

    /// Compiles `source`.
    fn compile<'a>(&'a self, source: &'a str) -> BoxFuture<'a, WebtaskResult<Module>>;
}

/// The webtask code attached to a request.
#[derive(Clone)]
pub enum Script {
    /// Source text, compiled on demand.
    Source(Arc<str>),
    /// An already compiled module; compilation is skipped.
    Compiled(Module),
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(source) => write!(f, "Script::Source({} bytes)", source.len()),
            Self::Compiled(_) => write!(f, "Script::Compiled"),
        }
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::Compiled(Module::default())
    }
}

impl From<Module> for Script {
    fn from(module: Module) -> Self {
        Self::Compiled(module)
    }
}

/// The compiler and script in effect for one request.
#[derive(Clone, Default)]
pub struct CompilerHandle {
    compiler: Option<Arc<dyn Compiler>>,
    script: Script,
}

impl CompilerHandle {
    /// Creates a handle with a compiler and a script.
    #[must_use]
    pub fn new(compiler: Arc<dyn Compiler>, script: Script) -> Self {
        Self {
            compiler: Some(compiler),
            script,
        }
    }

    /// Creates a handle for a precompiled webtask with no compiler.
    #[must_use]
    pub fn precompiled(module: Module) -> Self {
        Self {
            compiler: None,
            script: Script::Compiled(module),
        }
    }

    /// Returns the compiler in effect.
    #[must_use]
    pub fn compiler(&self) -> Option<&Arc<dyn Compiler>> {
        self.compiler.as_ref()
    }

    /// Replaces the compiler for the rest of this request.
    pub fn set_compiler(&mut self, compiler: Arc<dyn Compiler>) {
        self.compiler = Some(compiler);
    }

    /// Returns the webtask script.
    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Replaces the webtask script for the rest of this request.
    pub fn set_script(&mut self, script: Script) {
        self.script = script;
    }

    /// Compiles arbitrary source text with the compiler in effect.
    pub async fn compile_source(&self, source: &str) -> WebtaskResult<Module> {
        let compiler = self
            .compiler
            .as_ref()
            .ok_or_else(|| WebtaskError::resolution("no compiler is configured for this request"))?;
        compiler.compile(source).await
    }

    /// Produces the webtask module, compiling the script if needed.
    pub async fn compile_script(&self) -> WebtaskResult<Module> {
        match &self.script {
            Script::Compiled(module) => Ok(module.clone()),
            Script::Source(source) => self.compile_source(source).await,
        }
    }
}

impl fmt::Debug for CompilerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerHandle")
            .field("compiler", &self.compiler.as_ref().map(|c| c.name()))
            .field("script", &self.script)
            .finish()
    }
}
