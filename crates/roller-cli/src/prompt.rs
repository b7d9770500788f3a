use color_eyre::eyre::{
    self,
    WrapErr as _,
};
use dialoguer::{
    Confirm,
    Input,
    Select,
};

/// The interactive surface the workflows talk to.
pub(crate) trait Prompter: Send + Sync {
    fn confirm(&self, prompt: &str, default: bool) -> eyre::Result<bool>;

    fn input(&self, prompt: &str) -> eyre::Result<String>;

    /// Returns the index of the chosen item.
    fn select(&self, prompt: &str, items: &[&str]) -> eyre::Result<usize>;
}

/// Prompts on the controlling terminal.
pub(crate) struct Terminal;

impl Prompter for Terminal {
    fn confirm(&self, prompt: &str, default: bool) -> eyre::Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .wrap_err("an error occurred while waiting for user input")
    }

    fn input(&self, prompt: &str) -> eyre::Result<String> {
        let answer: String = Input::new()
            .with_prompt(prompt)
            .interact_text()
            .wrap_err("an error occurred while waiting for user input")?;
        Ok(answer.trim().to_string())
    }

    fn select(&self, prompt: &str, items: &[&str]) -> eyre::Result<usize> {
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()
            .wrap_err("an error occurred while waiting for user input")
    }
}
