//! Typed handler bindings.
//!
//! A handler is any async fn (or closure) shaped either `(RequestContext)` or
//! `(RequestContext, P)` where `P: Param`. The shape is checked by the
//! compiler when the route is registered; at dispatch time the binding only
//! decodes the payload into `P` and, when `P` opts in, validates it.

use std::{any::type_name, fmt, future::Future, pin::Pin};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::{errors::Error, router::context::RequestContext, Result};

pub type HandlerResult = Result<()>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

type Invoker = dyn Fn(RequestContext, &Value, bool) -> Result<HandlerFuture> + Send + Sync;

/// Structured request parameter.
///
/// Implementing this trait is what allows a type to appear as a handler's
/// second argument. Types that can check themselves set `VALIDATES` and
/// override [`Param::validate`].
pub trait Param: DeserializeOwned + Default + Send + 'static {
    const VALIDATES: bool = false;

    /// Check the decoded value. `raw` is the payload it was decoded from.
    fn validate(&self, _raw: &Value) -> Result<()> {
        Ok(())
    }
}

/// Convenience for [`Param::validate`] implementations.
pub fn invalid<P: ?Sized>(reason: impl Into<String>) -> Error {
    Error::Invalid {
        param: short_type_name::<P>(),
        reason: reason.into(),
    }
}

/// The declared parameter of a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamShape {
    pub type_name: &'static str,
    pub validates: bool,
}

/// Handler plus its declared parameter shape, built once per route.
pub struct HandlerBinding {
    param: Option<ParamShape>,
    invoke: Box<Invoker>,
}

impl HandlerBinding {
    pub fn param(&self) -> Option<ParamShape> {
        self.param
    }

    /// Build the handler call for one request.
    ///
    /// Decode and validation failures are logged and the handler still runs
    /// with a best-effort value, unless `strict` is set, in which case the
    /// failure is returned and nothing runs.
    pub fn prepare(
        &self,
        ctx: RequestContext,
        payload: &Value,
        strict: bool,
    ) -> Result<HandlerFuture> {
        (self.invoke)(ctx, payload, strict)
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("param", &self.param)
            .finish_non_exhaustive()
    }
}

/// Anything that can be bound to a route. `T` only distinguishes the two
/// accepted shapes.
pub trait Handler<T>: Send + Sync + 'static {
    fn into_binding(self) -> HandlerBinding;
}

impl<F, Fut> Handler<()> for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_binding(self) -> HandlerBinding {
        HandlerBinding {
            param: None,
            invoke: Box::new(
                move |ctx: RequestContext, _payload: &Value, _strict: bool| -> Result<HandlerFuture> {
                    Ok(Box::pin((self)(ctx)))
                },
            ),
        }
    }
}

impl<F, Fut, P> Handler<(P,)> for F
where
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
    P: Param,
{
    fn into_binding(self) -> HandlerBinding {
        HandlerBinding {
            param: Some(ParamShape {
                type_name: short_type_name::<P>(),
                validates: P::VALIDATES,
            }),
            invoke: Box::new(
                move |ctx: RequestContext, payload: &Value, strict: bool| -> Result<HandlerFuture> {
                    let param = decode_param::<P>(&ctx, payload, strict)?;
                    Ok(Box::pin((self)(ctx, param)))
                },
            ),
        }
    }
}

fn decode_param<P: Param>(ctx: &RequestContext, payload: &Value, strict: bool) -> Result<P> {
    let param = match P::deserialize(payload) {
        Ok(p) => p,
        Err(e) => {
            let err = Error::Decode {
                param: short_type_name::<P>(),
                reason: e.to_string(),
            };
            if strict {
                return Err(err);
            }
            warn!(action = %ctx.action, uid = %ctx.uid, error = %err, "param decode failed, using default");
            P::default()
        }
    };

    if P::VALIDATES {
        if let Err(err) = param.validate(payload) {
            if strict {
                return Err(err);
            }
            warn!(action = %ctx.action, uid = %ctx.uid, error = %err, "param validation failed");
        }
    }

    Ok(param)
}

fn short_type_name<P: ?Sized>() -> &'static str {
    let full = type_name::<P>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Ping {
        n: i64,
    }

    impl Param for Ping {
        const VALIDATES: bool = true;

        fn validate(&self, _raw: &Value) -> Result<()> {
            if self.n < 0 {
                return Err(invalid::<Self>("n must not be negative"));
            }
            Ok(())
        }
    }

    #[derive(Debug, Default, Deserialize)]
    struct Plain {
        #[allow(dead_code)]
        s: String,
    }

    impl Param for Plain {}

    fn ctx() -> RequestContext {
        RequestContext::new(crate::domain::UserId(1), 1, "t.ping")
    }

    fn recording() -> (Arc<Mutex<Vec<i64>>>, HandlerBinding) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let binding = (move |_ctx: RequestContext, p: Ping| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(p.n);
                Ok::<(), Error>(())
            }
        })
        .into_binding();
        (seen, binding)
    }

    #[test]
    fn records_param_shape() {
        let (_, binding) = recording();
        assert_eq!(
            binding.param(),
            Some(ParamShape {
                type_name: "Ping",
                validates: true
            })
        );

        let plain = (|_ctx: RequestContext, _p: Plain| async { Ok::<(), Error>(()) }).into_binding();
        assert_eq!(plain.param().map(|p| p.validates), Some(false));

        let bare = (|_ctx: RequestContext| async { Ok::<(), Error>(()) }).into_binding();
        assert_eq!(bare.param(), None);
    }

    #[tokio::test]
    async fn decodes_payload_into_param() {
        let (seen, binding) = recording();
        binding
            .prepare(ctx(), &json!({"n": 5}), false)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn lenient_mode_passes_default_on_decode_failure() {
        let (seen, binding) = recording();
        binding
            .prepare(ctx(), &json!({"n": "not a number"}), false)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn lenient_mode_passes_invalid_value_through() {
        let (seen, binding) = recording();
        binding
            .prepare(ctx(), &json!({"n": -3}), false)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![-3]);
    }

    #[test]
    fn strict_mode_rejects_before_running() {
        let (seen, binding) = recording();

        let err = binding.prepare(ctx(), &json!([1, 2]), true).err().unwrap();
        assert!(matches!(err, Error::Decode { param: "Ping", .. }));

        let err = binding.prepare(ctx(), &json!({"n": -1}), true).err().unwrap();
        assert!(matches!(err, Error::Invalid { param: "Ping", .. }));

        assert!(seen.lock().unwrap().is_empty());
    }
}
