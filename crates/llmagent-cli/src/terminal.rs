use std::io::Write;

use async_trait::async_trait;
use dialoguer::{Input, Select};
use llmagent_agents::EditorHost;
use tracing::warn;

/// Interactive host on the controlling terminal.
///
/// Prompts run on the blocking pool since dialoguer reads the tty synchronously.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalHost;

#[async_trait]
impl EditorHost for TerminalHost {
    fn display(&self, fragment: &str, finish: Option<&str>, _session: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(fragment.as_bytes());
        if finish.is_some() {
            let _ = out.write_all(b"\n");
        }
        let _ = out.flush();
    }

    async fn choose(&self, prompt: &str, options: &[&str]) -> Option<String> {
        let prompt = prompt.to_string();
        let default = safe_default(options);
        let items: Vec<String> = options.iter().map(|o| o.to_string()).collect();
        let picked = tokio::task::spawn_blocking(move || {
            let index = Select::new()
                .with_prompt(prompt)
                .items(&items)
                .default(default)
                .interact_opt()
                .ok()??;
            items.get(index).cloned()
        })
        .await;
        match picked {
            Ok(choice) => choice,
            Err(e) => {
                warn!("selection prompt failed: {e}");
                None
            }
        }
    }

    async fn input(&self, prompt: &str) -> Option<String> {
        let prompt = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
                .ok()
        })
        .await;
        match answer {
            Ok(text) => text,
            Err(e) => {
                warn!("input prompt failed: {e}");
                None
            }
        }
    }
}

/// Options that refuse, in order of preference.
const REFUSALS: [&str; 2] = ["Deny", "No"];

/// Index preselected in a menu: the refusing option, else the last one.
fn safe_default(options: &[&str]) -> usize {
    options
        .iter()
        .position(|option| REFUSALS.contains(option))
        .unwrap_or(options.len().saturating_sub(1))
}

/// Next line from stdin, `None` at end of input.
pub async fn read_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_picks_the_refusing_option() {
        assert_eq!(safe_default(&["Allow Once", "Always Allow", "Deny"]), 2);
        assert_eq!(safe_default(&["Yes", "No"]), 1);
        assert_eq!(safe_default(&["Yes", "No", "Revise"]), 1);
    }

    #[test]
    fn menus_without_a_refusal_default_to_the_last_entry() {
        assert_eq!(safe_default(&["a", "b", "c"]), 2);
        assert_eq!(safe_default(&[]), 0);
    }
}
