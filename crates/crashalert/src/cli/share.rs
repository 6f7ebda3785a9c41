//! Terminal stand-in for a native share sheet.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::dispatch::ShareSheet;
use crate::error::{Error, Result};

/// Prints the alert so the user can forward it by hand.
#[derive(Debug)]
pub struct ConsoleShareSheet<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleShareSheet {
    /// Share sheet that prints to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleShareSheet<W> {
    /// Share sheet that prints to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer lock is poisoned.
    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|_| Error::internal("share sheet writer lock poisoned"))
    }
}

#[async_trait]
impl<W: Write + Send + std::fmt::Debug> ShareSheet for ConsoleShareSheet<W> {
    async fn share(&self, title: &str, text: &str, url: Option<&str>) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| Error::internal("share sheet writer lock poisoned"))?;
        writeln!(out, "=== {title} ===")?;
        writeln!(out, "{text}")?;
        if let Some(url) = url {
            writeln!(out, "{url}")?;
        }
        writeln!(out, "Forward this message to your emergency contacts.")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_share_writes_message() {
        let sheet = ConsoleShareSheet::new(Vec::new());
        sheet
            .share("EMERGENCY", "Crash detected", Some("https://maps.example/?q=1,2"))
            .await
            .unwrap();

        let printed = String::from_utf8(sheet.into_inner().unwrap()).unwrap();
        assert!(printed.starts_with("=== EMERGENCY ==="));
        assert!(printed.contains("Crash detected"));
        assert!(printed.contains("https://maps.example/?q=1,2"));
    }

    #[tokio::test]
    async fn test_share_without_url() {
        let sheet = ConsoleShareSheet::new(Vec::new());
        sheet.share("T", "body", None).await.unwrap();
        let printed = String::from_utf8(sheet.into_inner().unwrap()).unwrap();
        assert_eq!(printed.lines().count(), 3);
    }
}
