// Terminal prompts for the interactive session

use anyhow::Result;
use async_trait::async_trait;
use dialoguer::{Confirm, Input, Password, Select};

use plex_upgrade::auth::Credentials;
use plex_upgrade::reconcile::{Choice, ChoiceRequest, Chooser};
use plex_upgrade::Error;

pub fn select(prompt: &str, items: &[String], default: usize) -> Result<usize> {
    Ok(Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(default)
        .interact()?)
}

pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

pub fn input(prompt: &str) -> Result<String> {
    Ok(Input::<String>::new().with_prompt(prompt).interact_text()?)
}

pub fn ask_credentials() -> Result<Credentials> {
    let username = input("Plex username or email")?;
    let password = Password::new().with_prompt("Password").interact()?;
    Ok(Credentials::password(username, password))
}

/// Menu entries for a replacement choice; entry 0 keeps the current track
fn choice_items(request: &ChoiceRequest) -> Vec<String> {
    let mut items = Vec::with_capacity(request.ranking.candidates.len() + 1);
    items.push(format!("Keep current [{}]", request.ranking.current));
    for candidate in &request.ranking.candidates {
        let note = if candidate.is_upgrade { "" } else { " (not better)" };
        items.push(format!("{} [{}]{}", candidate.track, candidate.score, note));
    }
    items
}

fn choice_from_selection(selection: usize) -> Choice {
    match selection {
        0 => Choice::Keep,
        n => Choice::Replace(n - 1),
    }
}

/// Asks on the terminal which alternative replaces a track
#[derive(Debug, Default)]
pub struct PromptChooser;

#[async_trait]
impl Chooser for PromptChooser {
    async fn choose(&mut self, request: &ChoiceRequest) -> plex_upgrade::Result<Choice> {
        let prompt = format!("{}. {}", request.position + 1, request.current);
        let items = choice_items(request);

        // dialoguer blocks on stdin
        let selection = tokio::task::spawn_blocking(move || select(&prompt, &items, 1))
            .await
            .map_err(|e| Error::Prompt(e.to_string()))?
            .map_err(|e| Error::Prompt(e.to_string()))?;

        Ok(choice_from_selection(selection))
    }
}
