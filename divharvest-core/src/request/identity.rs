//! Request-shape rotation.
//!
//! Each shape is a named header set that looks like a different browser.
//! The pool hands them out round-robin so every shape is used evenly over
//! a long run.

/// A header set sent with one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestShape {
    name: String,
    headers: Vec<(String, String)>,
}

impl RequestShape {
    pub fn new(name: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            headers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

fn browser(name: &str, user_agent: &str, accept_language: &str) -> RequestShape {
    RequestShape::new(
        name,
        vec![
            ("User-Agent".into(), user_agent.into()),
            ("Accept".into(), "application/json, text/plain, */*".into()),
            ("Accept-Language".into(), accept_language.into()),
            ("Origin".into(), "https://www.nasdaq.com".into()),
            ("Referer".into(), "https://www.nasdaq.com/".into()),
        ],
    )
}

/// The built-in shapes: desktop Chrome and Firefox on Windows and macOS.
pub fn default_shapes() -> Vec<RequestShape> {
    vec![
        browser(
            "chrome-windows",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "en-US,en;q=0.9",
        ),
        browser(
            "chrome-macos",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "en-US,en;q=0.8",
        ),
        browser(
            "firefox-windows",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
            "en-US,en;q=0.5",
        ),
        browser(
            "firefox-macos",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
            "en-GB,en;q=0.7",
        ),
    ]
}

/// Deterministic round-robin over a fixed set of shapes.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    shapes: Vec<RequestShape>,
    cursor: usize,
}

impl IdentityPool {
    /// An empty `shapes` falls back to [`default_shapes`].
    pub fn new(shapes: Vec<RequestShape>) -> Self {
        let shapes = if shapes.is_empty() {
            default_shapes()
        } else {
            shapes
        };
        Self { shapes, cursor: 0 }
    }

    pub fn next_shape(&mut self) -> RequestShape {
        let shape = self.shapes[self.cursor % self.shapes.len()].clone();
        self.cursor = (self.cursor + 1) % self.shapes.len();
        shape
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::new(default_shapes())
    }
}
