//! Native directory selection dialog.
//!
//! The host has no UI of its own; it borrows the platform's dialog tools.
//! Their stdout is always captured so nothing leaks into the protocol stream.

use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Something that can ask the user for a directory.
pub trait DirectoryPicker: Send + Sync {
    /// Show a folder chooser starting at `initial` (may be empty).
    ///
    /// Returns `None` when the user cancels or no dialog is available.
    fn select_folder(&self, initial: &str) -> Option<PathBuf>;
}

/// Picker backed by the platform dialog tools.
#[derive(Debug, Clone)]
pub struct SystemPicker {
    title: String,
}

impl SystemPicker {
    pub fn new() -> Self {
        Self {
            title: "Select base directory to watch".to_string(),
        }
    }
}

impl Default for SystemPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryPicker for SystemPicker {
    #[cfg(target_os = "macos")]
    fn select_folder(&self, initial: &str) -> Option<PathBuf> {
        let mut script = format!(
            "POSIX path of (choose folder with prompt \"{}\"",
            applescript_escape(&self.title)
        );
        if !initial.is_empty() {
            script.push_str(&format!(
                " default location POSIX file \"{}\"",
                applescript_escape(initial)
            ));
        }
        script.push(')');

        run_dialog("osascript", &["-e".to_string(), script])
    }

    #[cfg(windows)]
    fn select_folder(&self, initial: &str) -> Option<PathBuf> {
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms; \
             $d = New-Object System.Windows.Forms.FolderBrowserDialog; \
             $d.Description = '{}'; $d.SelectedPath = '{}'; \
             if ($d.ShowDialog() -eq 'OK') {{ $d.SelectedPath }}",
            powershell_escape(&self.title),
            powershell_escape(initial)
        );

        run_dialog(
            "powershell",
            &[
                "-NoProfile".to_string(),
                "-STA".to_string(),
                "-Command".to_string(),
                script,
            ],
        )
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    fn select_folder(&self, initial: &str) -> Option<PathBuf> {
        let mut zenity = vec![
            "--file-selection".to_string(),
            "--directory".to_string(),
            format!("--title={}", self.title),
        ];
        if !initial.is_empty() {
            // Trailing separator makes zenity open inside the directory
            zenity.push(format!("--filename={}/", initial.trim_end_matches('/')));
        }

        let kdialog = vec![
            "--getexistingdirectory".to_string(),
            if initial.is_empty() { ".".to_string() } else { initial.to_string() },
            "--title".to_string(),
            self.title.clone(),
        ];

        match run_tool("zenity", &zenity) {
            DialogRun::Finished(selection) => selection,
            DialogRun::Unavailable => run_dialog("kdialog", &kdialog),
        }
    }
}

enum DialogRun {
    /// The tool ran; `None` means the user cancelled.
    Finished(Option<PathBuf>),
    /// The tool could not be started.
    Unavailable,
}

fn run_dialog(program: &str, args: &[String]) -> Option<PathBuf> {
    match run_tool(program, args) {
        DialogRun::Finished(selection) => selection,
        DialogRun::Unavailable => None,
    }
}

fn run_tool(program: &str, args: &[String]) -> DialogRun {
    let output = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            crate::debug_event!("picker", "unavailable", "{program}: {e}");
            return DialogRun::Unavailable;
        }
    };

    if !output.status.success() {
        crate::debug_event!("picker", "cancelled", "{program} exited with {}", output.status);
        return DialogRun::Finished(None);
    }

    DialogRun::Finished(parse_selection(&output.stdout))
}

/// Interpret a dialog tool's stdout as a selected path.
fn parse_selection(stdout: &[u8]) -> Option<PathBuf> {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        None
    } else {
        Some(PathBuf::from(line))
    }
}

#[cfg(any(target_os = "macos", test))]
fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(any(windows, test))]
fn powershell_escape(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            parse_selection(b"/home/me/site\n"),
            Some(PathBuf::from("/home/me/site"))
        );
        assert_eq!(
            parse_selection(b"C:\\Users\\me\\site\r\n"),
            Some(PathBuf::from("C:\\Users\\me\\site"))
        );
        assert_eq!(parse_selection(b""), None);
        assert_eq!(parse_selection(b"   \n"), None);
    }

    #[test]
    fn test_escaping() {
        assert_eq!(applescript_escape(r#"my "site""#), r#"my \"site\""#);
        assert_eq!(powershell_escape("it's"), "it''s");
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let result = run_tool("filewatcher-no-such-dialog-tool", &[]);
        assert!(matches!(result, DialogRun::Unavailable));
        assert_eq!(run_dialog("filewatcher-no-such-dialog-tool", &[]), None);
    }
}
