use crate::commands::environment::skill_environment;
use anyhow::Result;
use bonsai_core::config::BonsaiConfig;
use bonsai_core::control::{load_behavior, BehaviorSource, LoadingResults};
use bonsai_core::core::SkillRegistry;
use colored::Colorize;
use std::path::Path;

/// Check a behavior file without running it. Returns whether it loads.
pub fn validate_behavior(file: &Path, config: &BonsaiConfig, strict: bool) -> Result<bool> {
    println!("{} Validating {}", "→".cyan(), file.display().to_string().yellow());

    let controller_config = if strict {
        config.controller.clone().with_strict_checks()
    } else {
        config.controller.clone()
    };

    let (results, behavior) = load_behavior(
        &BehaviorSource::File(file.to_path_buf()),
        &controller_config,
        &SkillRegistry::with_builtins(),
        &skill_environment(),
        &config.parse_options(),
    );
    tracing::debug!(
        "{}: {} errors, {} warnings",
        file.display(),
        results.errors.len(),
        results.warnings.len()
    );
    print_results(&results);

    match behavior {
        Some(behavior) => {
            let skills: Vec<&str> = behavior
                .bindings
                .values()
                .map(|b| b.state_id.as_str())
                .collect();
            println!(
                "\n{} {} states, {} skill states",
                "✅ Valid:".green().bold(),
                behavior.chart.state_ids().len(),
                skills.len()
            );
            for state in skills {
                println!("   {}", state.dimmed());
            }
            Ok(true)
        }
        None => {
            println!("\n{}", "❌ Invalid behavior".red().bold());
            Ok(false)
        }
    }
}

pub fn print_results(results: &LoadingResults) {
    for error in &results.errors {
        println!("  {} {}", "error:".red().bold(), error);
    }
    for warning in &results.warnings {
        println!("  {} {}", "warning:".yellow().bold(), warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_rejects_unhandled_exits() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("behavior.scxml");
        std::fs::write(
            &file,
            r#"<scxml initial="Noop#n"><state id="Noop#n"/><final id="Done"/></scxml>"#,
        )
        .unwrap();

        let config = BonsaiConfig::default();
        assert!(validate_behavior(&file, &config, false).unwrap());
        assert!(!validate_behavior(&file, &config, true).unwrap());
        assert!(!validate_behavior(&dir.path().join("missing.scxml"), &config, false).unwrap());
    }

    #[test]
    fn behaviors_that_run_also_validate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("speak.scxml");
        std::fs::write(
            &file,
            r##"<scxml initial="Speak#hello">
                 <state id="Speak#hello">
                   <datamodel><data id="#_MESSAGE" expr="'hello'"/></datamodel>
                   <transition event="Speak.success" target="Done"/>
                 </state>
                 <final id="Done"/>
               </scxml>"##,
        )
        .unwrap();

        let config = BonsaiConfig::default();
        assert!(validate_behavior(&file, &config, false).unwrap());

        let options = crate::commands::run::RunOptions {
            duration: Some(std::time::Duration::from_secs(5)),
            ..Default::default()
        };
        let outcome = crate::commands::run::run_behavior(
            &file,
            &config,
            &options,
            std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        )
        .unwrap();
        assert_eq!(
            outcome,
            crate::commands::run::RunOutcome::Finished(vec!["Done".to_string()])
        );
    }

    #[test]
    fn strict_mode_keeps_slot_settings() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("write.scxml");
        std::fs::write(
            &file,
            r##"<scxml initial="WriteSlot#w">
                 <state id="WriteSlot#w">
                   <datamodel><data id="#_VALUE" expr="'x'"/></datamodel>
                   <transition event="WriteSlot.success" target="Done"/>
                   <transition event="WriteSlot.error" target="Done"/>
                 </state>
                 <final id="Done"/>
               </scxml>"##,
        )
        .unwrap();

        let mut config = BonsaiConfig::default();
        assert!(validate_behavior(&file, &config, true).unwrap());

        config.controller.enable_default_slots = false;
        assert!(!validate_behavior(&file, &config, false).unwrap());
        assert!(!validate_behavior(&file, &config, true).unwrap());
    }
}
