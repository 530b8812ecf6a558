use winscout_core::WindowSnapshot;

pub struct TableFormatter {
    handle_width: usize,
    title_width: usize,
    process_width: usize,
    source_width: usize,
    path_width: usize,
}

impl TableFormatter {
    pub fn new(windows: &[WindowSnapshot]) -> Self {
        let title_width = windows
            .iter()
            .map(|w| w.title.chars().count())
            .max()
            .unwrap_or(16)
            .clamp(5, 50); // Between "Title" header min and reasonable terminal width max

        let source_width = windows
            .iter()
            .map(|w| w.source.chars().count())
            .max()
            .unwrap_or(8)
            .clamp(6, 20);

        Self {
            handle_width: 10,
            title_width,
            process_width: 16,
            source_width,
            path_width: 36,
        }
    }

    pub fn print_table(&self, windows: &[WindowSnapshot]) {
        self.print_header();
        for window in windows {
            self.print_row(window);
        }
        self.print_footer();
    }

    fn print_header(&self) {
        println!("{}", self.border('┌', '┬', '┐'));
        println!("{}", self.header_row());
        println!("{}", self.border('├', '┼', '┤'));
    }

    fn print_footer(&self) {
        println!("{}", self.border('└', '┴', '┘'));
    }

    fn print_row(&self, window: &WindowSnapshot) {
        let title = if window.is_fallback {
            format!("{} (fallback)", window.title)
        } else {
            window.title.clone()
        };

        println!(
            "│ {} │ {} │ {} │ {} │ {} │",
            truncate(&window.hwnd.to_string(), self.handle_width),
            truncate(&title, self.title_width),
            truncate(&window.process_name, self.process_width),
            truncate(&window.source, self.source_width),
            truncate(&window.executable_path, self.path_width),
        );
    }

    fn header_row(&self) -> String {
        format!(
            "│ {:<width_handle$} │ {:<width_title$} │ {:<width_process$} │ {:<width_source$} │ {:<width_path$} │",
            "Handle",
            "Title",
            "Process",
            "Source",
            "Path",
            width_handle = self.handle_width,
            width_title = self.title_width,
            width_process = self.process_width,
            width_source = self.source_width,
            width_path = self.path_width,
        )
    }

    fn border(&self, left: char, middle: char, right: char) -> String {
        let columns = [
            self.handle_width,
            self.title_width,
            self.process_width,
            self.source_width,
            self.path_width,
        ];
        let segments: Vec<String> = columns.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{left}{}{right}", segments.join(&middle.to_string()))
    }
}

/// Truncate a string to a maximum display width, adding "..." if truncated.
///
/// Uses character count (not byte count) to safely handle UTF-8 titles.
pub fn truncate(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        format!("{:<width$}", s, width = max_len)
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{:<width$}", format!("{}...", truncated), width = max_len)
    }
}
