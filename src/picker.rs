use std::fs;
use std::path::{Path, PathBuf};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::fuzzy;

/// Local filesystem navigator for choosing an upload source. Same
/// navigate-and-filter pattern as the object browser, scoped to one
/// directory at a time.
#[derive(Clone, Debug)]
pub struct FilePicker {
    pub cwd: PathBuf,
    entries: Vec<LocalEntry>,
    pub query: String,
    pub cursor: usize,
    pub show_hidden: bool,
}

#[derive(Clone, Debug)]
pub struct LocalEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PickerOutcome {
    Pending,
    Cancelled,
    Picked(PathBuf),
}

impl FilePicker {
    /// Returns `None` when the root directory cannot be read, so the caller
    /// can fall back to a typed-path prompt.
    pub fn open(root: PathBuf, show_hidden: bool) -> Option<Self> {
        let entries = read_entries(&root, show_hidden).ok()?;
        Some(Self {
            cwd: root,
            entries,
            query: String::new(),
            cursor: 0,
            show_hidden,
        })
    }

    pub fn visible(&self) -> Vec<&LocalEntry> {
        fuzzy::rank(&self.query, self.entries.iter().collect(), |entry| {
            entry.name.as_str()
        })
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> PickerOutcome {
        let len = self.visible().len();
        match key.code {
            KeyCode::Esc => return PickerOutcome::Cancelled,
            KeyCode::Enter | KeyCode::Char('l') => return self.activate(),
            KeyCode::Up | KeyCode::Char('k') => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.cursor + 1 < len {
                    self.cursor += 1;
                }
            }
            KeyCode::Char('g') => self.cursor = 0,
            KeyCode::Char('G') => self.cursor = len.saturating_sub(1),
            KeyCode::Char('h') | KeyCode::Left => self.go_parent(),
            KeyCode::Char('.') => self.toggle_hidden(),
            KeyCode::Backspace => {
                if self.query.pop().is_none() {
                    self.go_parent();
                } else {
                    self.cursor = 0;
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.query.push(c);
                self.cursor = 0;
            }
            _ => {}
        }
        PickerOutcome::Pending
    }

    fn activate(&mut self) -> PickerOutcome {
        let target = self
            .visible()
            .get(self.cursor)
            .map(|entry| (entry.path.clone(), entry.is_dir));
        match target {
            Some((path, true)) => {
                self.enter_dir(path);
                PickerOutcome::Pending
            }
            Some((path, false)) => PickerOutcome::Picked(path),
            None => PickerOutcome::Pending,
        }
    }

    /// A directory that fails to read is left alone; the picker stays put.
    fn enter_dir(&mut self, dir: PathBuf) {
        if let Ok(entries) = read_entries(&dir, self.show_hidden) {
            self.cwd = dir;
            self.entries = entries;
            self.query.clear();
            self.cursor = 0;
        }
    }

    fn go_parent(&mut self) {
        if let Some(parent) = self.cwd.parent() {
            self.enter_dir(parent.to_path_buf());
        }
    }

    fn toggle_hidden(&mut self) {
        self.show_hidden = !self.show_hidden;
        if let Ok(entries) = read_entries(&self.cwd, self.show_hidden) {
            self.entries = entries;
        }
        self.cursor = 0;
    }
}

fn read_entries(dir: &Path, show_hidden: bool) -> std::io::Result<Vec<LocalEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !show_hidden && name.starts_with('.') {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        entries.push(LocalEntry {
            path: entry.path(),
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            name,
        });
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn scratch_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        File::create(dir.path().join(".secrets")).unwrap();
        File::create(dir.path().join("docs/report.pdf")).unwrap();
        dir
    }

    fn visible_names(picker: &FilePicker) -> Vec<String> {
        picker.visible().iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_directories_sort_first_and_hidden_stay_out() {
        let dir = scratch_tree();
        let picker = FilePicker::open(dir.path().to_path_buf(), false).unwrap();
        assert_eq!(visible_names(&picker), vec!["docs", "notes.txt"]);
    }

    #[test]
    fn test_dot_key_reveals_hidden_entries() {
        let dir = scratch_tree();
        let mut picker = FilePicker::open(dir.path().to_path_buf(), false).unwrap();
        picker.handle_key(key(KeyCode::Char('.')));
        assert!(visible_names(&picker).contains(&".secrets".to_string()));
        picker.handle_key(key(KeyCode::Char('.')));
        assert!(!visible_names(&picker).contains(&".secrets".to_string()));
    }

    #[test]
    fn test_enter_descends_into_directory_then_picks_file() {
        let dir = scratch_tree();
        let mut picker = FilePicker::open(dir.path().to_path_buf(), false).unwrap();
        assert_eq!(picker.handle_key(key(KeyCode::Enter)), PickerOutcome::Pending);
        assert!(picker.cwd.ends_with("docs"));
        let outcome = picker.handle_key(key(KeyCode::Enter));
        assert_eq!(
            outcome,
            PickerOutcome::Picked(dir.path().join("docs/report.pdf"))
        );
    }

    #[test]
    fn test_typing_filters_and_backspace_pops_before_ascending() {
        let dir = scratch_tree();
        let mut picker = FilePicker::open(dir.path().to_path_buf(), false).unwrap();
        picker.handle_key(key(KeyCode::Char('n')));
        picker.handle_key(key(KeyCode::Char('o')));
        assert_eq!(visible_names(&picker), vec!["notes.txt"]);

        picker.handle_key(key(KeyCode::Backspace));
        picker.handle_key(key(KeyCode::Backspace));
        assert_eq!(picker.cwd, dir.path());
        assert_eq!(picker.query, "");

        picker.handle_key(key(KeyCode::Backspace));
        assert_eq!(picker.cwd, dir.path().parent().unwrap());
    }

    #[test]
    fn test_descending_clears_the_query() {
        let dir = scratch_tree();
        let mut picker = FilePicker::open(dir.path().to_path_buf(), false).unwrap();
        picker.handle_key(key(KeyCode::Char('d')));
        assert_eq!(visible_names(&picker), vec!["docs"]);
        picker.handle_key(key(KeyCode::Char('l')));
        assert_eq!(picker.query, "");
        assert!(picker.cwd.ends_with("docs"));
    }

    #[test]
    fn test_jump_keys_clamp_to_list() {
        let dir = scratch_tree();
        let mut picker = FilePicker::open(dir.path().to_path_buf(), false).unwrap();
        picker.handle_key(key(KeyCode::Char('G')));
        assert_eq!(picker.cursor, 1);
        picker.handle_key(key(KeyCode::Char('j')));
        assert_eq!(picker.cursor, 1);
        picker.handle_key(key(KeyCode::Char('g')));
        assert_eq!(picker.cursor, 0);
    }

    #[test]
    fn test_escape_cancels() {
        let dir = scratch_tree();
        let mut picker = FilePicker::open(dir.path().to_path_buf(), false).unwrap();
        assert_eq!(picker.handle_key(key(KeyCode::Esc)), PickerOutcome::Cancelled);
    }

    #[test]
    fn test_unreadable_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(FilePicker::open(missing, false).is_none());
    }
}
