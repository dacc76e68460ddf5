use crate::ui::Icons;
use owo_colors::{OwoColorize, Style};
use std::sync::OnceLock;

static PALETTE: OnceLock<Palette> = OnceLock::new();

/// Styles for CLI output; plain when stdout is not a terminal or `NO_COLOR` is set
#[derive(Debug, Clone)]
pub struct Palette {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    pub dim: Style,
}

impl Palette {
    fn detect() -> Self {
        let colored = std::env::var_os("NO_COLOR").is_none() && console::Term::stdout().is_term();
        let pick = |style: Style| if colored { style } else { Style::new() };
        Self {
            header: pick(Style::new().cyan().bold()),
            success: pick(Style::new().green().bold()),
            error: pick(Style::new().red().bold()),
            warn: pick(Style::new().yellow().bold()),
            info: pick(Style::new().magenta()),
            dim: pick(Style::new().dimmed()),
        }
    }
}

pub fn palette() -> &'static Palette {
    PALETTE.get_or_init(Palette::detect)
}

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(palette().header.clone()));
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(palette().dim.clone()), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(palette().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(palette().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(palette().warn.clone()));
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(palette().header.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(palette().dim.clone()).to_string()
}

/// Table names, one per line, marked as created or already present
pub fn table_line(name: &str, created: bool) {
    if created {
        println!("  {} {}", Icons::CHECK, name.style(palette().success.clone()));
    } else {
        println!("  {} {} {}", Icons::INFO.style(palette().info.clone()), name, dim("(exists)"));
    }
}
