use colored::Colorize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn print_version_info() {
    println!("{} {}", "bonsai".green().bold(), VERSION);
    println!("   SCXML skill state machine runtime");
    println!(
        "   {} {}",
        "built-in skills:".dimmed(),
        bonsai_core::core::SkillRegistry::with_builtins().names().join(", ")
    );
}
