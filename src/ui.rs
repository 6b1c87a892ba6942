//! UI相关功能模块
//!
//! 提供横幅和统一格式的控制台提示

use colored::*;
use console::Term;

const LOGO: &str = r#"
╔═╗╔═╗╔═╗╦═╗╦╔═  ╔╗╔╔═╗╔╦╗╔═╗
╚═╗╠═╝╠═╣╠╦╝╠╩╗  ║║║║ ║ ║║║╣
╚═╝╩  ╩ ╩╩╚═╩ ╩  ╝╚╝╚═╝═╩╝╚═╝
"#;

/// 打印横幅
pub fn print_banner(version: &str) {
    println!("{}", LOGO.bright_cyan().bold());
    println!("{}", "Device node runner with per-node proxies".bright_black());
    println!("{} {}\n", "Version:".bright_black(), version.yellow());
}

/// 打印错误消息
pub fn print_error(msg: &str) {
    println!("{} {}", "✗".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "!".yellow().bold(), msg);
}

/// 初始化UI：终端可用时清屏
pub fn init_ui(color: bool) {
    colored::control::set_override(color);
    let term = Term::stdout();
    if term.is_term() {
        let _ = term.clear_screen();
    }
}
