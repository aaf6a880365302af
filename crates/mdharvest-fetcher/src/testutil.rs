//! Canned-response transports for fetcher tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use mdharvest_core::{FetchError, Transport};

/// Replays a fixed sequence of responses, one per request, recording
/// every URL (and header set) it was asked for.
pub(crate) struct SeqTransport {
    bodies: RefCell<VecDeque<Result<String, FetchError>>>,
    pub requests: RefCell<Vec<String>>,
    pub headers: RefCell<Vec<Vec<(String, String)>>>,
}

impl SeqTransport {
    pub fn new<S: AsRef<str>>(bodies: &[S]) -> Self {
        Self {
            bodies: RefCell::new(bodies.iter().map(|b| Ok(b.as_ref().to_string())).collect()),
            requests: RefCell::new(Vec::new()),
            headers: RefCell::new(Vec::new()),
        }
    }

    /// No responses: any request is an error. For tests that only
    /// exercise construction.
    pub fn empty() -> Self {
        Self::new::<&str>(&[])
    }

    pub fn with_results(bodies: Vec<Result<String, FetchError>>) -> Self {
        Self {
            bodies: RefCell::new(bodies.into()),
            requests: RefCell::new(Vec::new()),
            headers: RefCell::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl Transport for SeqTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String, FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        self.headers.borrow_mut().push(headers.to_vec());
        self.bodies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Protocol(format!("no canned response for {url}"))))
    }
}

/// Routes requests by URL prefix; each route replays its bodies in
/// order and repeats the last one once drained.
pub(crate) struct RouteTransport {
    routes: RefCell<Vec<(String, VecDeque<String>, Option<String>)>>,
    pub requests: RefCell<Vec<String>>,
}

impl RouteTransport {
    pub fn new(routes: &[(&str, &[&str])]) -> Self {
        Self {
            routes: RefCell::new(
                routes
                    .iter()
                    .map(|(prefix, bodies)| {
                        let last = bodies.last().map(|b| b.to_string());
                        (
                            prefix.to_string(),
                            bodies.iter().map(|b| b.to_string()).collect(),
                            last,
                        )
                    })
                    .collect(),
            ),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl Transport for RouteTransport {
    fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<String, FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        let mut routes = self.routes.borrow_mut();
        for (prefix, bodies, last) in routes.iter_mut() {
            if url.starts_with(prefix.as_str()) {
                return match (bodies.pop_front(), last.as_ref()) {
                    (Some(body), _) => Ok(body),
                    (None, Some(body)) => Ok(body.clone()),
                    (None, None) => {
                        Err(FetchError::Protocol(format!("empty route for {url}")))
                    }
                };
            }
        }
        Err(FetchError::Protocol(format!("no route for {url}")))
    }
}
