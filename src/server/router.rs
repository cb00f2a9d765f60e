//! A dead-simple router implementation
//!
//! A `Router` simply matches a request-uri against installed routes, in the
//! order they have been added, dispatching to the first handler that matches.

use crate::errors::*;
use crate::server::{Handler, Request, Response, Fresh};
use crate::server::error_messages::*;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct Router {
    routes: Vec<Route>
}

struct Route {
    path: PathBuf,
    handlers: MethodDispatch
}

enum MethodDispatch {
    Any(Box<dyn Handler>),
    Specific(HashMap<String, Box<dyn Handler>>)
}

/// What a request path and method resolve to
pub enum Selection<'a> {
    Handler(&'a dyn Handler),
    MethodNotAllowed,
    NotFound
}

impl Router {
    fn serve_inner(&self, req: Request, res: Response<Fresh>) -> Result<()> {
        let selection = self.select(Path::new(req.request_uri()), req.method());

        match selection {
            Selection::Handler(handler) => handler.serve(req, res),
            Selection::MethodNotAllowed => error_405(res)?,
            Selection::NotFound => error_404(res)?
        }

        Ok(())
    }

    /// Initialize a new, empty router
    pub fn new() -> Router {
        Router { routes: Vec::new() }
    }

    /// Finds the handler for `method` on the first route `path` falls under
    ///
    /// Prefixes match whole path components, so `/cgi-bin` covers
    /// `/cgi-bin/x` but not `/cgi-binx`.
    pub fn select<'a>(&'a self, path: &Path, method: &str) -> Selection<'a> {
        for route in &self.routes {
            if path.starts_with(&route.path) {
                return route.handlers.select(method);
            }
        }

        Selection::NotFound
    }

    /// Create a route that will invoke the given `handler` for all methods
    pub fn route_any<H: Handler + 'static>(&mut self, path: PathBuf, handler: H)
    {
        self.routes.push(Route {
            path: path,
            handlers: MethodDispatch::Any(Box::new(handler))
        });
    }

    /// Create a route that will invoke the given `handler`, but only for the
    /// particular `method`.
    pub fn route<H: Handler + 'static>(&mut self, path: PathBuf, method: String,
                                       handler: H) {
        for route in self.routes.iter_mut() {
            if route.path == path {
                match route.handlers {
                    MethodDispatch::Specific(ref mut map) =>
                    {map.insert(method, Box::new(handler));},
                    MethodDispatch::Any(_) =>
                    {panic!("Tried to add a universal and method-specific route for the same prefix");}
                }
                return;
            }
        }

        let mut handlers: HashMap<_, Box<dyn Handler>> = HashMap::new();
        handlers.insert(method, Box::new(handler));

        self.routes.push(Route {
            path: path,
            handlers: MethodDispatch::Specific(handlers)
        });
    }
}

impl Handler for Router {
    fn serve(&self, req: Request, res: Response<Fresh>) {
        match self.serve_inner(req, res) {
            Ok(_) => (),
            Err(e) => warn!("Error serving a request: {:?}", e)
        }
    }
}

impl MethodDispatch {
    fn select(&self, method: &str) -> Selection {
        match *self {
            MethodDispatch::Any(ref handler) => Selection::Handler(&**handler),
            MethodDispatch::Specific(ref map) => match map.get(method) {
                Some(handler) => Selection::Handler(&**handler),
                None => Selection::MethodNotAllowed
            }
        }
    }
}
