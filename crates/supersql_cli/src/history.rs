use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rustyline::{Config, DefaultEditor};
use tracing::debug;

/// Environment variable naming the history file; empty disables history.
pub const HISTORY_ENV: &str = "SSQL_HISTORY";
const HISTORY_FILE: &str = ".ssql_history";
const MAX_ENTRIES: usize = 2000;

/// Where REPL input is remembered between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHistory {
    path: Option<PathBuf>,
}

impl CommandHistory {
    pub fn locate() -> Self {
        Self::resolve(std::env::var_os(HISTORY_ENV), dirs_next::home_dir())
    }

    fn resolve(configured: Option<OsString>, home: Option<PathBuf>) -> Self {
        let path = match configured {
            Some(v) if v.is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
            None => home.map(|h| h.join(HISTORY_FILE)),
        };
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Line editor that drops repeats and lines typed with a leading space.
    pub fn editor(&self) -> Result<DefaultEditor> {
        let config = Config::builder()
            .max_history_size(MAX_ENTRIES)?
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .auto_add_history(false)
            .build();
        Ok(DefaultEditor::with_config(config)?)
    }

    /// Missing or unreadable files start an empty history.
    pub fn restore(&self, rl: &mut DefaultEditor) {
        let Some(path) = self.path.as_deref().filter(|p| p.exists()) else {
            return;
        };
        match rl.load_history(path) {
            Ok(()) => debug!("history restored from {}", path.display()),
            Err(e) => debug!("history not restored from {}: {}", path.display(), e),
        }
    }

    pub fn persist(&self, rl: &mut DefaultEditor) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        match rl.save_history(path) {
            Ok(()) => debug!("history saved to {}", path.display()),
            Err(e) => debug!("history not saved to {}: {}", path.display(), e),
        }
    }
}

/// Quit commands are not worth recalling.
pub fn worth_recording(line: &str) -> bool {
    let t = line.trim();
    !t.is_empty() && t != "\\q" && t != "\\quit"
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::History;

    #[test]
    fn test_resolve_path() {
        let home = Some(PathBuf::from("/home/ana"));
        assert_eq!(
            CommandHistory::resolve(None, home.clone()).path(),
            Some(Path::new("/home/ana/.ssql_history"))
        );
        assert_eq!(
            CommandHistory::resolve(Some("/tmp/h".into()), home.clone()).path(),
            Some(Path::new("/tmp/h"))
        );
        assert_eq!(CommandHistory::resolve(Some("".into()), home).path(), None);
        assert_eq!(CommandHistory::resolve(None, None).path(), None);
    }

    #[test]
    fn test_history_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let history = CommandHistory::resolve(Some(dir.path().join("h").into()), None);

        let mut rl = history.editor().unwrap();
        rl.add_history_entry("SELECT 1").unwrap();
        rl.add_history_entry("SELECT 1").unwrap();
        rl.add_history_entry(" SET SESSION secret = 'x'").unwrap();
        rl.add_history_entry("SHOW TABLES").unwrap();
        history.persist(&mut rl);

        let mut again = history.editor().unwrap();
        history.restore(&mut again);
        assert_eq!(again.history().len(), 2);
    }

    #[test]
    fn test_disabled_history_touches_nothing() {
        let history = CommandHistory::resolve(Some("".into()), None);
        let mut rl = history.editor().unwrap();
        rl.add_history_entry("SELECT 1").unwrap();
        history.persist(&mut rl);
        history.restore(&mut rl);
        assert_eq!(rl.history().len(), 1);
    }

    #[test]
    fn test_worth_recording() {
        assert!(worth_recording("SELECT 1;"));
        assert!(worth_recording("\\dt web"));
        assert!(!worth_recording("  "));
        assert!(!worth_recording("\\q"));
    }
}
