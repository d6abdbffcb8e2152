use supports_color::Stream;

use dashvars::core::propagation::LoadState;

#[derive(Debug, Clone, Copy)]
enum Tone {
    Green,
    Red,
    Yellow,
    Cyan,
    Blue,
    Gray,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Green => "\x1b[32m",
            Tone::Red => "\x1b[31m",
            Tone::Yellow => "\x1b[33m",
            Tone::Cyan => "\x1b[36m",
            Tone::Blue => "\x1b[34m",
            Tone::Gray => "\x1b[90m",
        }
    }
}

pub struct Printer {
    pub use_color: bool,
}

impl Printer {
    pub fn new() -> Self {
        let use_color = supports_color::on(Stream::Stdout).is_some();
        Self { use_color }
    }

    fn paint(&self, tone: Tone, text: &str) -> String {
        if self.use_color {
            format!("{}{}\x1b[0m", tone.code(), text)
        } else {
            text.to_string()
        }
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.paint(Tone::Green, "[+]"), message);
    }

    pub fn error(&self, message: &str) {
        println!("{} {}", self.paint(Tone::Red, "[-]"), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", self.paint(Tone::Yellow, "[!]"), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", self.paint(Tone::Cyan, "[?]"), message);
    }

    pub fn header(&self, title: &str) {
        if self.use_color {
            println!("\n\x1b[1;36m{}\x1b[0m", title);
        } else {
            println!("\n{}", title);
        }
        println!("{}", self.paint(Tone::Gray, &"─".repeat(title.chars().count())));
    }

    pub fn subheader(&self, title: &str) {
        if self.use_color {
            println!("\n\x1b[1m{}\x1b[0m", title);
        } else {
            println!("\n{}", title);
        }
    }

    pub fn print_key_value(&self, key: &str, value: &str, indent: usize) {
        let indent_str = " ".repeat(indent);
        if self.use_color {
            println!("{}\x1b[1m{}:\x1b[0m {}", indent_str, key, value);
        } else {
            println!("{}{}: {}", indent_str, key, value);
        }
    }

    pub fn print_list_item(&self, item: &str, indent: usize) {
        println!("{}{} {}", " ".repeat(indent), self.paint(Tone::Cyan, "•"), item);
    }

    pub fn print_indented(&self, text: &str, indent: usize) {
        let indent_str = " ".repeat(indent);
        for line in text.lines() {
            println!("{}{}", indent_str, line);
        }
    }

    pub fn state(&self, state: LoadState) -> String {
        let tone = match state {
            LoadState::Idle => Tone::Gray,
            LoadState::Pending => Tone::Yellow,
            LoadState::Loading | LoadState::PartiallyLoaded => Tone::Blue,
            LoadState::Resolved => Tone::Green,
        };
        self.paint(tone, &state.to_string())
    }
}
