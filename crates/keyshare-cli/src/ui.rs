//! Terminal output helpers, using `colored`.

use colored::Colorize;
use keyshare_wire::Pdu;

/// Section header: ">> Title" in cyan.
pub fn section(title: &str) {
    println!("  {} {}", ">>".bright_cyan().bold(), title.bold());
}

/// Key-value display: "  Label:       value".
pub fn kv(label: &str, value: &str) {
    println!("  {:<13}{}", format!("{label}:"), value);
}

pub fn success(msg: &str) {
    println!("  {} {}", "\u{2714}".bright_green(), msg);
}

pub fn error(msg: &str) {
    eprintln!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
}

/// Red error + yellow "fix:" suggestion.
pub fn error_with_fix(msg: &str, fix: &str) {
    error(msg);
    eprintln!("    {} {}", "fix:".bright_yellow(), fix);
}

pub fn hint(msg: &str) {
    println!("  {} {}", "hint:".dimmed(), msg.dimmed());
}

pub fn blank() {
    println!();
}

/// Print a response PDU: the labelled dump, then each result and error.
pub fn response(pdu: &Pdu) {
    section(&format!("Response {}", pdu.request_id));
    println!("{pdu}");
    blank();
    for item in &pdu.list {
        println!("  {} {}", "=".bright_green(), item);
    }
    for err in &pdu.errors {
        println!("  {} {}", "!".bright_red(), err.to_string().bright_red());
    }
}
