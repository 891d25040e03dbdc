//! Action dispatch tree.
//!
//! Routes are registered once at startup into [`RouterBuilder`]; `build`
//! checks the tree and freezes it into a [`Router`] that never changes
//! afterwards. Dispatch walks one path segment per namespace level and runs
//! the first leaf it reaches; segments left over after a leaf are ignored.

pub mod binding;
pub mod context;
pub mod node;

use std::fmt;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{domain::UserId, errors::Error, message::Request, Result};

pub use binding::{invalid, Handler, HandlerBinding, HandlerFuture, HandlerResult, Param, ParamShape};
pub use context::RequestContext;
pub use node::{Leaf, Namespace, Route, RouteDef};

use node::RouteNode;

pub const PATH_SEPARATOR: char = '.';

#[derive(Debug, Default)]
pub struct RouterBuilder {
    routes: Vec<RouteDef>,
    strict_params: bool,
}

impl RouterBuilder {
    pub fn add(mut self, route: impl Into<RouteDef>) -> Self {
        self.routes.push(route.into());
        self
    }

    /// Reject requests whose parameter fails to decode or validate.
    pub fn strict_params(mut self, strict: bool) -> Self {
        self.strict_params = strict;
        self
    }

    /// Check names and freeze the tree. Errors here are fatal: the server
    /// must not start serving with a partially built tree.
    pub fn build(self) -> Result<Router> {
        let root = RouteNode::freeze_namespace("", self.routes)?;
        let router = Router {
            root,
            strict_params: self.strict_params,
        };

        let paths = router.paths();
        info!(routes = paths.len(), strict_params = router.strict_params, "action tree built");
        for path in &paths {
            debug!(%path, "route");
        }
        Ok(router)
    }
}

/// Immutable action tree.
#[derive(Debug)]
pub struct Router {
    root: RouteNode,
    strict_params: bool,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Resolve `action` to the leaf that would handle it.
    pub fn resolve(&self, action: &str) -> Option<&Leaf> {
        let mut segments = action.split(PATH_SEPARATOR);
        let mut node = &self.root;
        loop {
            match node {
                RouteNode::Leaf(leaf) => return Some(leaf),
                RouteNode::Namespace(children) => {
                    node = children.get(segments.next()?)?;
                }
            }
        }
    }

    /// Resolve and run the handler for one request.
    ///
    /// Returns [`Error::NoRouteMatches`] when nothing matched. The handler's
    /// own result is logged, never returned: replies are the handler's job.
    pub async fn dispatch(&self, uid: UserId, seq: i64, action: &str, payload: &Value) -> Result<()> {
        let Some(leaf) = self.resolve(action) else {
            debug!(%uid, action, "no route matches");
            return Err(Error::NoRouteMatches);
        };

        let ctx = RequestContext::new(uid, seq, action);
        let call = leaf.binding.prepare(ctx, payload, self.strict_params)?;
        if let Err(e) = call.await {
            warn!(%uid, action, route = %leaf.path, error = %e, "handler failed");
        }
        Ok(())
    }

    pub async fn dispatch_request(&self, req: &Request) -> Result<()> {
        self.dispatch(req.uid, req.seq, &req.action, &req.data).await
    }

    /// Full paths of every leaf, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut leaves = Vec::new();
        self.root.collect_leaves(&mut leaves);
        let mut paths: Vec<String> = leaves.into_iter().map(|l| l.path.clone()).collect();
        paths.sort();
        paths
    }
}

impl fmt::Display for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut leaves = Vec::new();
        self.root.collect_leaves(&mut leaves);
        leaves.sort_by(|a, b| a.path.cmp(&b.path));
        for leaf in leaves {
            match leaf.binding.param() {
                Some(p) => writeln!(f, "{}\t({})", leaf.path, p.type_name)?,
                None => writeln!(f, "{}", leaf.path)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, Default, Deserialize)]
    struct Named {
        name: String,
    }

    impl Param for Named {
        const VALIDATES: bool = true;

        fn validate(&self, _raw: &Value) -> Result<()> {
            if self.name.is_empty() {
                return Err(invalid::<Self>("name is required"));
            }
            Ok(())
        }
    }

    fn tag(log: &Log, label: &'static str) -> impl Fn(RequestContext) -> HandlerFuture {
        let log = log.clone();
        move |ctx: RequestContext| -> HandlerFuture {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(format!("{label}:{}:{}", ctx.uid, ctx.action));
                Ok(())
            })
        }
    }

    fn named(log: &Log) -> impl Fn(RequestContext, Named) -> HandlerFuture {
        let log = log.clone();
        move |_ctx: RequestContext, p: Named| -> HandlerFuture {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(format!("named:{}", p.name));
                Ok(())
            })
        }
    }

    fn tree(log: &Log) -> Router {
        Router::builder()
            .add(
                Namespace::new("group")
                    .route("create", tag(log, "create"))
                    .route("join", tag(log, "join"))
                    .add(Namespace::new("member").route("add", tag(log, "member.add"))),
            )
            .add(Namespace::new("user").route("rename", named(log)))
            .add(Route::new("ping", tag(log, "ping")))
            .build()
            .unwrap()
    }

    fn taken(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[tokio::test]
    async fn dispatch_runs_exactly_the_matching_leaf() {
        let log = Log::default();
        let router = tree(&log);

        router
            .dispatch(UserId(9), 1, "group.join", &Value::Null)
            .await
            .unwrap();
        assert_eq!(taken(&log), vec!["join:9:group.join"]);

        router
            .dispatch(UserId(9), 2, "group.member.add", &Value::Null)
            .await
            .unwrap();
        assert_eq!(taken(&log), vec!["member.add:9:group.member.add"]);
    }

    #[tokio::test]
    async fn trailing_segments_after_a_leaf_are_ignored() {
        let log = Log::default();
        let router = tree(&log);

        router
            .dispatch(UserId(1), 1, "ping.extra.stuff", &Value::Null)
            .await
            .unwrap();
        assert_eq!(taken(&log), vec!["ping:1:ping.extra.stuff"]);
    }

    #[tokio::test]
    async fn unknown_or_truncated_paths_miss() {
        let log = Log::default();
        let router = tree(&log);

        for action in ["group", "group.member", "group.delete", "Group.create", "", "nope.x"] {
            let err = router
                .dispatch(UserId(1), 1, action, &Value::Null)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NoRouteMatches), "{action}");
        }
        assert!(taken(&log).is_empty());
    }

    #[tokio::test]
    async fn invalid_param_still_reaches_handler_by_default() {
        let log = Log::default();
        let router = tree(&log);

        router
            .dispatch(UserId(1), 1, "user.rename", &json!({"name": ""}))
            .await
            .unwrap();
        router
            .dispatch(UserId(1), 1, "user.rename", &json!("garbage"))
            .await
            .unwrap();
        assert_eq!(taken(&log), vec!["named:", "named:"]);
    }

    #[tokio::test]
    async fn strict_router_rejects_invalid_param() {
        let log = Log::default();
        let router = Router::builder()
            .strict_params(true)
            .add(Namespace::new("user").route("rename", named(&log)))
            .build()
            .unwrap();

        let err = router
            .dispatch(UserId(1), 1, "user.rename", &json!({"name": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invalid { .. }));

        router
            .dispatch(UserId(1), 1, "user.rename", &json!({"name": "ok"}))
            .await
            .unwrap();
        assert_eq!(taken(&log), vec!["named:ok"]);
    }

    #[tokio::test]
    async fn handler_errors_are_not_returned() {
        let router = Router::builder()
            .add(Route::new("fail", |_ctx: RequestContext| async {
                Err::<(), Error>(Error::business("group not found"))
            }))
            .build()
            .unwrap();
        router
            .dispatch(UserId(1), 1, "fail", &Value::Null)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_dispatch_keeps_paths_apart() {
        let log = Log::default();
        let router = Arc::new(tree(&log));

        let mut tasks = Vec::new();
        for i in 0..64i64 {
            let router = router.clone();
            tasks.push(tokio::spawn(async move {
                let action = if i % 2 == 0 { "group.create" } else { "group.join" };
                router
                    .dispatch(UserId(i), i, action, &Value::Null)
                    .await
                    .unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let entries = taken(&log);
        assert_eq!(entries.len(), 64);
        for e in entries {
            let mut parts = e.split(':');
            let label = parts.next().unwrap();
            let uid: i64 = parts.next().unwrap().parse().unwrap();
            let expected = if uid % 2 == 0 { "create" } else { "join" };
            assert_eq!(label, expected, "{e}");
        }
    }

    #[test]
    fn duplicate_names_fail_registration() {
        let log = Log::default();
        let err = Router::builder()
            .add(Namespace::new("group").route("create", tag(&log, "a")))
            .add(Namespace::new("group").route("join", tag(&log, "b")))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[test]
    fn bad_segment_names_fail_registration() {
        let log = Log::default();
        for name in ["", "a.b"] {
            let err = Router::builder()
                .add(Namespace::new("x").route(name, tag(&log, "a")))
                .build()
                .unwrap_err();
            assert!(matches!(err, Error::Registration(_)), "{name:?}");
        }
    }

    #[test]
    fn lists_full_paths() {
        let log = Log::default();
        let router = tree(&log);
        assert_eq!(
            router.paths(),
            vec![
                "group.create",
                "group.join",
                "group.member.add",
                "ping",
                "user.rename"
            ]
        );
        assert!(router.to_string().contains("user.rename\t(Named)"));
    }
}
