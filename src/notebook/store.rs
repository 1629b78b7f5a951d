//! File-backed notebook store. Each notebook lives at `<dir>/<id>.json`.

use crate::cell::Cell;
use crate::diagnostics::{DiagCode, Outcome};
use crate::error::Result;
use crate::notebook::Notebook;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct NotebookStore {
    dir: PathBuf,
    notebook: Notebook,
}

impl NotebookStore {
    /// Open a store over `dir`, creating the directory if needed. The active
    /// notebook starts empty and is not written until it changes.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            notebook: Notebook::default(),
        })
    }

    pub fn notebook(&self) -> &Notebook {
        &self.notebook
    }

    pub fn set_notebook(&mut self, notebook: Notebook) {
        self.notebook = notebook;
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Append a cell at the next conversation position and persist.
    pub fn add_cell(&mut self, mut cell: Cell) -> Result<()> {
        cell.context.conversation_position = self.notebook.cells.len() + 1;
        self.notebook.cells.push(cell);
        self.notebook.touch();
        self.save()
    }

    /// Replace the cell with `cell_id` wholesale. Returns false when absent.
    pub fn update_cell(&mut self, cell_id: &str, cell: Cell) -> Result<bool> {
        let Some(slot) = self.notebook.cells.iter_mut().find(|c| c.id == cell_id) else {
            return Ok(false);
        };
        *slot = cell;
        self.notebook.touch();
        self.save()?;
        Ok(true)
    }

    pub fn delete_cell(&mut self, cell_id: &str) -> Result<bool> {
        let Some(index) = self.notebook.cells.iter().position(|c| c.id == cell_id) else {
            return Ok(false);
        };
        self.notebook.cells.remove(index);
        self.notebook.touch();
        self.save()?;
        Ok(true)
    }

    pub fn update_cell_title(&mut self, cell_id: &str, title: &str) -> Result<bool> {
        let Some(cell) = self.notebook.cells.iter_mut().find(|c| c.id == cell_id) else {
            return Ok(false);
        };
        cell.title = Some(title.to_string());
        self.notebook.touch();
        self.save()?;
        Ok(true)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.notebook.cells
    }

    pub fn cell(&self, cell_id: &str) -> Option<&Cell> {
        self.notebook.cells.iter().find(|c| c.id == cell_id)
    }

    /// Write the active notebook to `<id>.json.tmp`, then rename over
    /// `<id>.json`.
    pub fn save(&self) -> Result<()> {
        let path = self.path_for(&self.notebook.id);
        let tmp = path.with_extension("json.tmp");
        let mut text = serde_json::to_string_pretty(&self.notebook)?;
        text.push('\n');
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        info!(
            "Saved notebook {} ({} cells)",
            self.notebook.id,
            self.notebook.cells.len()
        );
        Ok(())
    }

    pub fn load(&self, notebook_id: &str) -> Outcome<Notebook> {
        let path = self.path_for(notebook_id);
        if !path.exists() {
            let mut outcome = Outcome::new();
            outcome.error(
                DiagCode::NotFound,
                format!("Notebook {} not found", notebook_id),
            );
            return outcome;
        }
        match read_notebook(&path) {
            Ok(notebook) => Outcome::success(notebook),
            Err(e) => {
                let mut outcome = Outcome::new();
                outcome.error(DiagCode::LoadError, format!("Failed to load notebook: {}", e));
                outcome
            }
        }
    }

    /// Most recently updated notebook for `connection_name`. Unreadable
    /// files are skipped.
    pub fn load_latest(&self, connection_name: &str) -> Option<Notebook> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list notebooks in {}: {}", self.dir.display(), e);
                return None;
            }
        };

        entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_notebook_file(path))
            .filter_map(|path| match read_notebook(&path) {
                Ok(notebook) => Some(notebook),
                Err(e) => {
                    warn!("Skipping corrupt notebook {}: {}", path.display(), e);
                    None
                }
            })
            .filter(|notebook| notebook.connection_name == connection_name)
            .max_by_key(|notebook| notebook.updated_at)
    }
}

fn is_notebook_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with("nb_") && name.ends_with(".json")
}

fn read_notebook(path: &Path) -> Result<Notebook> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, NotebookStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = NotebookStore::open(dir.path().join("notebooks")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_add_cell_sets_position_and_persists() {
        let (_dir, mut store) = store();
        store.add_cell(Cell::new("first")).unwrap();
        store.add_cell(Cell::new("second")).unwrap();

        assert_eq!(store.cells()[0].context.conversation_position, 1);
        assert_eq!(store.cells()[1].context.conversation_position, 2);

        let id = store.notebook().id.clone();
        let loaded = store.load(&id).into_data().unwrap();
        assert_eq!(loaded.cells.len(), 2);
        assert_eq!(loaded.cells[1].question, "second");
        assert!(!store.path_for(&id).with_extension("json.tmp").exists());
    }

    #[test]
    fn test_update_delete_and_title() {
        let (_dir, mut store) = store();
        let cell = Cell::new("revenue");
        let id = cell.id.clone();
        store.add_cell(cell).unwrap();

        let mut replacement = store.cell(&id).unwrap().clone();
        replacement.question = "revenue by month".to_string();
        assert!(store.update_cell(&id, replacement).unwrap());
        assert_eq!(store.cell(&id).unwrap().question, "revenue by month");
        assert!(!store.update_cell("cell_missing", Cell::new("x")).unwrap());

        assert!(store.update_cell_title(&id, "Monthly revenue").unwrap());
        assert_eq!(store.cell(&id).unwrap().title.as_deref(), Some("Monthly revenue"));

        assert!(store.delete_cell(&id).unwrap());
        assert!(!store.delete_cell(&id).unwrap());
        assert!(store.cells().is_empty());
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let (_dir, store) = store();
        let missing = store.load("nb_000000000000");
        assert_eq!(missing.errors().next().unwrap().code, DiagCode::NotFound);

        fs::write(store.path_for("nb_badbadbadbad"), "{not json").unwrap();
        let corrupt = store.load("nb_badbadbadbad");
        assert_eq!(corrupt.errors().next().unwrap().code, DiagCode::LoadError);
        assert!(corrupt.data.is_none());
    }

    #[test]
    fn test_load_latest_picks_newest_for_connection() {
        let (_dir, mut store) = store();

        let mut old = Notebook::new("shop");
        old.updated_at = old.updated_at - Duration::hours(1);
        store.set_notebook(old);
        store.save().unwrap();

        let newer = Notebook::new("shop");
        let newer_id = newer.id.clone();
        store.set_notebook(newer);
        store.save().unwrap();

        store.set_notebook(Notebook::new("warehouse"));
        store.save().unwrap();

        fs::write(store.path_for("nb_corruptcorru"), "[]").unwrap();

        assert_eq!(store.load_latest("shop").unwrap().id, newer_id);
        assert!(store.load_latest("nobody").is_none());
    }
}
