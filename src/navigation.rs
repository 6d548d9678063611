// Navigation capability
// Models the three execution contexts a redirect can run in

use std::collections::VecDeque;
use std::sync::Mutex;

/// What kind of redirect the current execution context can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationCapability {
    /// A browser window: a hard redirect (full page load) is possible
    Browser,
    /// Server-side rendering with the HTTP response still open: an HTTP
    /// redirect can be written as long as headers have not been sent
    ServerResponse { headers_sent: bool },
    /// Neither: only client-side route changes are available
    ClientRouting,
}

/// A navigation performed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Client-side route change
    Route(String),
    /// Full page navigation; all in-memory state is discarded
    Hard(String),
    /// HTTP redirect written into the server response
    Http { status: u16, url: String },
}

impl Navigation {
    pub fn url(&self) -> &str {
        match self {
            Navigation::Route(url) | Navigation::Hard(url) => url,
            Navigation::Http { url, .. } => url,
        }
    }
}

/// Router/navigation seam consumed by the session engine
///
/// The engine never talks to a window or response object directly; it asks
/// for the context's capability and issues one of the three navigation
/// kinds. Route history is bounded and most-recent-last.
pub trait Navigator: Send + Sync {
    fn capability(&self) -> NavigationCapability;

    /// Perform a navigation of the given kind
    fn perform(&self, navigation: Navigation);

    /// The route currently being displayed, if any
    fn current_url(&self) -> Option<String>;

    /// Previously visited routes, oldest first
    fn history(&self) -> Vec<String>;
}

const HISTORY_LIMIT: usize = 50;

/// In-memory navigator that records everything it is asked to do
///
/// Doubles as the test navigator and as the client-routing default before
/// a real router is attached.
pub struct RecordingNavigator {
    capability: NavigationCapability,
    history: Mutex<VecDeque<String>>,
    performed: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn new(capability: NavigationCapability) -> Self {
        Self {
            capability,
            history: Mutex::new(VecDeque::new()),
            performed: Mutex::new(Vec::new()),
        }
    }

    /// Record a visited route, as a router integration would on every
    /// completed navigation
    pub fn record_visit(&self, url: &str) {
        let mut history = self.history.lock().unwrap();
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(url.to_string());
    }

    /// Everything the engine asked this navigator to perform, in order
    pub fn performed(&self) -> Vec<Navigation> {
        self.performed.lock().unwrap().clone()
    }

    pub fn last_performed(&self) -> Option<Navigation> {
        self.performed.lock().unwrap().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn capability(&self) -> NavigationCapability {
        self.capability
    }

    fn perform(&self, navigation: Navigation) {
        tracing::debug!(navigation = ?navigation, "Performing navigation");
        if let Navigation::Route(url) = &navigation {
            self.record_visit(url);
        }
        self.performed.lock().unwrap().push(navigation);
    }

    fn current_url(&self) -> Option<String> {
        self.history.lock().unwrap().back().cloned()
    }

    fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().iter().cloned().collect()
    }
}
