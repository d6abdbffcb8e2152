use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;

use crate::output::Printer;

pub struct Repl {
    editor: DefaultEditor,
    history_file: PathBuf,
    printer: Printer,
}

impl Repl {
    pub fn new() -> Result<Self, String> {
        let mut editor = DefaultEditor::new()
            .map_err(|e| format!("Failed to initialize line editor: {}", e))?;

        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let state_dir = home.join(".dashvars");
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir)
                .map_err(|e| format!("Failed to create .dashvars directory: {}", e))?;
        }

        let history_file = state_dir.join("repl_history.txt");
        if history_file.exists() {
            editor.load_history(&history_file).ok();
        }

        Ok(Self {
            editor,
            history_file,
            printer: Printer::new(),
        })
    }

    /// `Ok(None)` on an empty line or Ctrl+C; `Err(Eof)` ends the session.
    pub fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ReadlineError> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    return Ok(None);
                }
                self.editor.add_history_entry(&line)?;
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn save_history(&mut self) -> Result<(), String> {
        self.editor.save_history(&self.history_file)
            .map_err(|e| format!("Failed to save REPL history: {}", e))
    }

    pub fn printer(&self) -> &Printer {
        &self.printer
    }
}
