//! Operator prompts: interactive on a terminal, or fixed answers from flags.
//!
//! Questions and summaries go to stderr; stdout carries only the output
//! bundle.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::future::Future;
use std::io::Write;
use supaforge_core::Operation;
use supaforge_runtime::{
    Confirmation, InputAnswer, InputField, InputValues, OperatorPrompt, ProvisionRequest, Review,
};
use tokio::sync::watch;
use tokio::task::JoinError;

/// Reads answers line by line from stdin.
///
/// A pending question ends as if stdin hit EOF once `interrupted` turns
/// true, so Ctrl-C aborts the session without waiting for Enter.
#[derive(Debug, Clone)]
pub struct StdinPrompt {
    interrupted: watch::Receiver<bool>,
}

/// Answers every question from command-line flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedPrompt {
    pub accept: bool,
    pub provision: Option<ProvisionRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReviewChoice {
    Accept,
    Regenerate,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProvisionChoice {
    Skip,
    SqlOnly,
    Execute,
}

impl StdinPrompt {
    pub fn new(interrupted: watch::Receiver<bool>) -> Self {
        Self { interrupted }
    }

    /// Print `question` to stderr and read one trimmed line; `None` on EOF
    /// or interrupt.
    async fn ask(&self, question: String) -> anyhow::Result<Option<String>> {
        let read = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<String>> {
            let mut stderr = std::io::stderr();
            write!(stderr, "{}", question)?;
            stderr.flush()?;
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line)? == 0 {
                return Ok(None);
            }
            Ok(Some(line.trim().to_string()))
        });
        answer_or_interrupt(read, self.interrupted.clone()).await
    }
}

/// The answer `read` produces, or `None` once `interrupted` is true.
///
/// A dropped sender never counts as an interrupt.
async fn answer_or_interrupt<F>(
    read: F,
    mut interrupted: watch::Receiver<bool>,
) -> anyhow::Result<Option<String>>
where
    F: Future<Output = Result<anyhow::Result<Option<String>>, JoinError>>,
{
    tokio::select! {
        answer = read => answer?,
        Ok(_) = interrupted.wait_for(|fired| *fired) => {
            eprintln!();
            Ok(None)
        }
    }
}

fn parse_categories(text: &str) -> Result<BTreeSet<Operation>, String> {
    let categories = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<BTreeSet<Operation>, String>>()?;
    if categories.is_empty() {
        return Err("no categories given".to_string());
    }
    Ok(categories)
}

fn parse_review_choice(text: &str) -> Option<ReviewChoice> {
    match text.to_lowercase().as_str() {
        "a" | "accept" | "y" | "yes" => Some(ReviewChoice::Accept),
        "r" | "regenerate" => Some(ReviewChoice::Regenerate),
        "q" | "quit" | "abort" => Some(ReviewChoice::Quit),
        _ => None,
    }
}

fn parse_provision_choice(text: &str) -> Option<ProvisionChoice> {
    match text.to_lowercase().as_str() {
        "" | "n" | "no" => Some(ProvisionChoice::Skip),
        "s" | "sql" => Some(ProvisionChoice::SqlOnly),
        "e" | "execute" => Some(ProvisionChoice::Execute),
        _ => None,
    }
}

fn is_yes(text: &str) -> bool {
    matches!(text.to_lowercase().as_str(), "y" | "yes")
}

/// Summary printed before asking for acceptance.
fn review_summary(review: &Review<'_>) -> String {
    let categories: Vec<&str> = review.categories.iter().map(|c| c.as_str()).collect();
    let mut lines = vec![format!(
        "\nCompiled {} tool(s) for {} [{}] (round {}):",
        review.output.tools.len(),
        review.project_ref,
        categories.join(", "),
        review.round
    )];
    for tool in &review.output.tools {
        lines.push(format!("   • {} ({})", tool.name, tool.operation));
    }
    if !review.output.skipped.is_empty() {
        lines.push(format!("Skipped ({}):", review.output.skipped.len()));
        for skip in &review.output.skipped {
            lines.push(format!(
                "   • {} {}: {}",
                skip.operation, skip.resource, skip.reason
            ));
        }
    }
    if !review.limitations.is_empty() {
        lines.push("Discovery limitations:".to_string());
        for limitation in review.limitations {
            lines.push(format!("   • {}: {}", limitation.tool, limitation.error));
        }
    }
    lines.join("\n")
}

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn ask_missing(&self, fields: &[InputField]) -> anyhow::Result<InputAnswer> {
        let mut values = InputValues::default();
        for field in fields {
            let hint = if field.is_required() {
                "required"
            } else {
                "blank to skip"
            };
            let Some(answer) = self.ask(format!("{} ({}): ", field, hint)).await? else {
                return Ok(InputAnswer::Abort);
            };
            if answer.is_empty() {
                values.declined.insert(*field);
                continue;
            }
            match field {
                InputField::ProjectRef => values.project_ref = Some(answer),
                InputField::OwnerEmail => values.owner_email = Some(answer),
                InputField::Categories => match parse_categories(&answer) {
                    Ok(categories) => values.categories = Some(categories),
                    Err(e) => eprintln!("   {}", e),
                },
            }
        }
        Ok(InputAnswer::Values(values))
    }

    async fn confirm(&self, review: &Review<'_>) -> anyhow::Result<Confirmation> {
        eprintln!("{}", review_summary(review));

        let choice = loop {
            let Some(answer) = self.ask("[a]ccept, [r]egenerate or [q]uit? ".to_string()).await? else {
                return Ok(Confirmation::Abort);
            };
            if let Some(choice) = parse_review_choice(&answer) {
                break choice;
            }
        };

        match choice {
            ReviewChoice::Quit => Ok(Confirmation::Abort),
            ReviewChoice::Regenerate => loop {
                let Some(answer) = self.ask("categories (e.g. select,update): ".to_string()).await?
                else {
                    return Ok(Confirmation::Abort);
                };
                match parse_categories(&answer) {
                    Ok(categories) => return Ok(Confirmation::Regenerate { categories }),
                    Err(e) => eprintln!("   {}", e),
                }
            },
            ReviewChoice::Accept => {
                let provision = loop {
                    let Some(answer) = self.ask(
                        "Provision the configuration store? [n]o, [s]ql only, [e]xecute: "
                            .to_string(),
                    )
                    .await?
                    else {
                        return Ok(Confirmation::Abort);
                    };
                    if let Some(choice) = parse_provision_choice(&answer) {
                        break choice;
                    }
                };
                if provision == ProvisionChoice::Skip {
                    return Ok(Confirmation::Accept { provision: None });
                }
                let Some(answer) = self
                    .ask("Store these tools as the next active version? [y/N]: ".to_string())
                    .await?
                else {
                    return Ok(Confirmation::Abort);
                };
                let insert_tools = is_yes(&answer);
                Ok(Confirmation::Accept {
                    provision: Some(ProvisionRequest {
                        execute: provision == ProvisionChoice::Execute,
                        insert_tools,
                    }),
                })
            }
        }
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn ask_missing(&self, fields: &[InputField]) -> anyhow::Result<InputAnswer> {
        Ok(InputAnswer::Values(InputValues {
            declined: fields.iter().copied().collect(),
            ..Default::default()
        }))
    }

    async fn confirm(&self, review: &Review<'_>) -> anyhow::Result<Confirmation> {
        eprintln!("{}", review_summary(review));
        if !self.accept {
            return Ok(Confirmation::Abort);
        }
        Ok(Confirmation::Accept {
            provision: self.provision,
        })
    }
}
