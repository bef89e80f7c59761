//! Evaluation driver
//!
//! An [`Engine`] bundles what a host needs to run compiled function trees:
//! configuration, the conversion context, a native registry, the proxy
//! table for named definitions and, when `FEM_TRACE` asks for it, a tracer.
//!
//! ```ignore
//! let engine = Engine::from_env();
//! let add = engine.native("integer.add")?;
//! let double = Function::compose(add, vec![Function::param(0), Function::param(0)]);
//! engine.define("double", double)?;
//! engine.link()?;
//! let call = Function::compose(engine.proxy("double"), vec![Function::param(0)]);
//! let value = engine.evaluate(&call, vec![Value::integer(21)])?;
//! ```

use crate::config::EngineConfig;
use crate::logging::{LogListener, init_logging};
use crate::natives::NativeRegistry;
use fem_core::{
    Context, FemArray, FemResult, FemString, Frame, Function, ProxyTable, Tracer, Value,
};

/// Runs function trees against a configured root frame
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    context: Context,
    root: Frame,
    natives: NativeRegistry,
    proxies: ProxyTable,
    tracer: Option<Tracer>,
}

impl Engine {
    /// Engine with the standard natives and the process-wide default context.
    pub fn new(config: EngineConfig) -> Self {
        let tracer = config
            .trace
            .is_enabled()
            .then(|| Tracer::new(LogListener::new(config.trace)));
        let context = Context::current();
        Self {
            root: Frame::from(context.clone()),
            context,
            natives: NativeRegistry::standard(),
            proxies: ProxyTable::new(),
            tracer,
            config,
        }
    }

    /// Engine configured from the environment, with logging installed.
    pub fn from_env() -> Self {
        let config = EngineConfig::from_env();
        init_logging(&config);
        Self::new(config)
    }

    /// Replaces the conversion context used by the root frame.
    pub fn with_context(mut self, context: Context) -> Self {
        self.root = Frame::from(context.clone());
        self.context = context;
        self
    }

    pub fn with_natives(mut self, natives: NativeRegistry) -> Self {
        self.natives = natives;
        self
    }

    /// Installs `tracer`, replacing the one chosen by the configuration.
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    pub fn proxies(&self) -> &ProxyTable {
        &self.proxies
    }

    pub fn tracer(&self) -> Option<&Tracer> {
        self.tracer.as_ref()
    }

    /// Root frame without parameters, carrying the engine's context.
    pub fn root_frame(&self) -> Frame {
        self.root.clone()
    }

    /// The registered native `name`.
    pub fn native(&self, name: &str) -> FemResult<Function> {
        Ok(self.traced(&self.natives.get(name)?))
    }

    /// Forward reference to the definition `name`.
    pub fn proxy(&self, name: &str) -> Function {
        Function::from(self.proxies.proxy(name))
    }

    /// Defines `name`, returning a reference to it.
    pub fn define(&self, name: &str, function: Function) -> FemResult<Function> {
        let proxy = self.proxies.define(name, self.traced(&function))?;
        Ok(Function::from(proxy))
    }

    /// Verifies that every referenced definition exists.
    pub fn link(&self) -> FemResult<()> {
        self.proxies.link()
    }

    /// String value built with the configured leaf width.
    pub fn string(&self, text: &str) -> Value {
        Value::String(FemString::with_encoding(text, self.config.string_encoding))
    }

    /// Invokes `function` with `params` as the assured parameters of a child
    /// of the root frame.
    pub fn evaluate(&self, function: &Function, params: impl Into<FemArray>) -> FemResult<Value> {
        let function = self.traced(function);
        let frame = self.root.new_frame_values(params.into());
        tracing::debug!(params = frame.size(), "evaluating");
        let value = function.invoke(&frame)?;
        if self.config.force_results {
            value.result(true)
        } else {
            Ok(value)
        }
    }

    fn traced(&self, function: &Function) -> Function {
        match &self.tracer {
            Some(tracer) => function.trace(tracer),
            None => function.clone(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
