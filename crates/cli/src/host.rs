//! Terminal implementation of the session's navigation capability.

use {tracing::warn, wicket_oauth::Navigator};

/// Opens the system browser, or prints the URL when asked not to (or when no
/// browser can be launched).
pub struct BrowserNavigator {
    open_browser: bool,
}

impl BrowserNavigator {
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &str) {
        if self.open_browser {
            println!("Opening browser for authentication...");
            match open::that(url) {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "could not open browser"),
            }
        }
        println!("Visit this URL to continue:\n{url}");
    }
}
