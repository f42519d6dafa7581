//! Output functions for buildpack log formatting

use super::context::UiContext;
use console::style;

/// Indent used for detail lines under a step header
pub const INDENT: &str = "       ";

/// Prefix every line of `text` with the detail indent
pub fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", INDENT, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Display a step header (`-----> Installing ruby`)
pub fn step(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        println!("{} {}", style("----->").cyan().bold(), style(title).bold());
    } else {
        println!("-----> {}", title);
    }
}

/// Display an informational detail line
pub fn info(_ctx: &UiContext, message: &str) {
    println!("{}", indent(message));
}

/// Display one line of child process output
pub fn indented(line: &str) {
    println!("{}{}", INDENT, line);
}

/// Display a warning block
pub fn warning(ctx: &UiContext, message: &str) {
    let body = indent(message);
    if ctx.use_fancy_output() {
        eprintln!("\n{}{}", style(format!("{}**WARNING** ", INDENT)).yellow().bold(), body.trim_start());
    } else {
        eprintln!("\n{}**WARNING** {}", INDENT, body.trim_start());
    }
}
