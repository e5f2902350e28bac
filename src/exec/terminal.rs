// src/exec/terminal.rs

/// Characters of output kept for display.
pub const MAX_TERMINAL_BUFFER: usize = 120_000;

/// Rolling buffer of command output that keeps only the newest text.
#[derive(Debug, Clone)]
pub struct TerminalBuffer {
    text: String,
    limit: usize,
}

impl Default for TerminalBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_TERMINAL_BUFFER)
    }
}

impl TerminalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `limit` counts characters, not bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.trim();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    fn trim(&mut self) {
        let chars = self.text.chars().count();
        if chars <= self.limit {
            return;
        }
        let cut = self
            .text
            .char_indices()
            .nth(chars - self.limit)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len());
        self.text.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_characters() {
        let mut buf = TerminalBuffer::with_limit(5);
        buf.push("abc");
        buf.push("de\n");
        assert_eq!(buf.as_str(), "bcde\n");
        assert_eq!(buf.into_string(), "bcde\n");
    }

    #[test]
    fn trims_on_char_boundaries() {
        let mut buf = TerminalBuffer::with_limit(2);
        buf.push("héé");
        assert_eq!(buf.as_str(), "éé");
    }
}
