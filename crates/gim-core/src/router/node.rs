//! Route definitions and the frozen dispatch tree built from them.

use std::collections::HashMap;

use crate::{
    errors::Error,
    router::{
        binding::{Handler, HandlerBinding},
        PATH_SEPARATOR,
    },
    Result,
};

/// A leaf definition: one name bound to one handler.
#[derive(Debug)]
pub struct Route {
    name: String,
    binding: HandlerBinding,
}

impl Route {
    /// Bind `handler` under `name`.
    ///
    /// A handler takes the request context and at most one [`Param`]:
    ///
    /// ```
    /// use gim_core::{router::{Param, RequestContext, Route}, Error};
    /// use serde::Deserialize;
    ///
    /// #[derive(Default, Deserialize)]
    /// struct Ping {
    ///     n: i64,
    /// }
    /// impl Param for Ping {}
    ///
    /// Route::new("status", |_ctx: RequestContext| async { Ok::<(), Error>(()) });
    /// Route::new("ping", |_ctx: RequestContext, p: Ping| async move {
    ///     let _ = p.n;
    ///     Ok::<(), Error>(())
    /// });
    /// ```
    ///
    /// Anything else is rejected when the route is built. The context must
    /// come first:
    ///
    /// ```compile_fail
    /// use gim_core::{router::Route, Error};
    ///
    /// Route::new("status", |_who: String| async { Ok::<(), Error>(()) });
    /// ```
    ///
    /// At most one parameter may follow it:
    ///
    /// ```compile_fail
    /// use gim_core::{router::{Param, RequestContext, Route}, Error};
    /// use serde::Deserialize;
    ///
    /// #[derive(Default, Deserialize)]
    /// struct Ping {
    ///     n: i64,
    /// }
    /// impl Param for Ping {}
    ///
    /// Route::new("ping", |_ctx: RequestContext, _a: Ping, _b: Ping| async {
    ///     Ok::<(), Error>(())
    /// });
    /// ```
    ///
    /// And that parameter must implement [`Param`]:
    ///
    /// ```compile_fail
    /// use gim_core::{router::{RequestContext, Route}, Error};
    /// use serde::Deserialize;
    ///
    /// #[derive(Default, Deserialize)]
    /// struct Loose {
    ///     n: i64,
    /// }
    ///
    /// Route::new("loose", |_ctx: RequestContext, _p: Loose| async {
    ///     Ok::<(), Error>(())
    /// });
    /// ```
    ///
    /// [`Param`]: crate::router::Param
    pub fn new<H, T>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T>,
    {
        Self {
            name: name.into(),
            binding: handler.into_binding(),
        }
    }
}

/// A namespace definition holding named children.
#[derive(Debug, Default)]
pub struct Namespace {
    name: String,
    children: Vec<RouteDef>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn add(mut self, child: impl Into<RouteDef>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn route<H, T>(self, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T>,
    {
        self.add(Route::new(name, handler))
    }
}

#[derive(Debug)]
pub enum RouteDef {
    Leaf(Route),
    Namespace(Namespace),
}

impl RouteDef {
    fn name(&self) -> &str {
        match self {
            RouteDef::Leaf(r) => &r.name,
            RouteDef::Namespace(n) => &n.name,
        }
    }
}

impl From<Route> for RouteDef {
    fn from(r: Route) -> Self {
        RouteDef::Leaf(r)
    }
}

impl From<Namespace> for RouteDef {
    fn from(n: Namespace) -> Self {
        RouteDef::Namespace(n)
    }
}

/// Bound leaf of the frozen tree.
#[derive(Debug)]
pub struct Leaf {
    pub path: String,
    pub binding: HandlerBinding,
}

#[derive(Debug)]
pub(crate) enum RouteNode {
    Leaf(Leaf),
    Namespace(HashMap<String, RouteNode>),
}

impl RouteNode {
    /// Freeze the children of a namespace definition.
    ///
    /// `prefix` is the full path of the namespace ("" for the root).
    pub(crate) fn freeze_namespace(prefix: &str, children: Vec<RouteDef>) -> Result<Self> {
        let mut frozen = HashMap::with_capacity(children.len());
        for child in children {
            check_segment(prefix, child.name())?;
            let path = if prefix.is_empty() {
                child.name().to_string()
            } else {
                format!("{prefix}{PATH_SEPARATOR}{}", child.name())
            };
            if frozen.contains_key(child.name()) {
                return Err(Error::Registration(format!("duplicate route {path:?}")));
            }

            let (name, node) = match child {
                RouteDef::Leaf(r) => (
                    r.name,
                    RouteNode::Leaf(Leaf {
                        path,
                        binding: r.binding,
                    }),
                ),
                RouteDef::Namespace(n) => (n.name, Self::freeze_namespace(&path, n.children)?),
            };
            frozen.insert(name, node);
        }
        Ok(RouteNode::Namespace(frozen))
    }

    pub(crate) fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
        match self {
            RouteNode::Leaf(leaf) => out.push(leaf),
            RouteNode::Namespace(children) => {
                for child in children.values() {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

fn check_segment(prefix: &str, name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty route name"
    } else if name.contains(PATH_SEPARATOR) {
        "route name contains the path separator"
    } else {
        return Ok(());
    };
    Err(Error::Registration(format!(
        "{reason}: {name:?} under {:?}",
        if prefix.is_empty() { "<root>" } else { prefix }
    )))
}
