//! Route registration with documentation.
//!
//! Applications register handlers through [`Routes`] instead of building an
//! axum `Router` directly, so that every route can be listed by
//! `GateServer::route_docs` and the `--routes` flag of the binary.

use axum::{
    handler::Handler,
    routing::{delete, get, patch, post, put, MethodRouter},
    Router,
};
use serde::Serialize;

/// One documented route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDoc {
    pub method: String,
    pub path: String,
}

impl RouteDoc {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
        }
    }
}

/// Router plus the list of registered routes.
#[derive(Debug, Default)]
pub struct Routes {
    router: Router,
    docs: Vec<RouteDoc>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method_router` at `path`, documented as `method`.
    pub fn route(mut self, method: &str, path: &str, method_router: MethodRouter) -> Self {
        self.router = self.router.route(path, method_router);
        self.docs.push(RouteDoc::new(method, path));
        self
    }

    pub fn get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route("GET", path, get(handler))
    }

    pub fn post<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route("POST", path, post(handler))
    }

    pub fn put<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route("PUT", path, put(handler))
    }

    pub fn patch<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route("PATCH", path, patch(handler))
    }

    pub fn delete<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route("DELETE", path, delete(handler))
    }

    pub fn docs(&self) -> &[RouteDoc] {
        &self.docs
    }

    pub fn into_parts(self) -> (Router, Vec<RouteDoc>) {
        (self.router, self.docs)
    }
}
