//! Terminal rendition of the configuration surfaces.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, MultiSelect, Select};
use lifecycle::traits::{CapError, CapResult, ColorScheme, SchemaItem, SurfaceOps};

/// Prompts on the controlling terminal. Escape dismisses a picker.
pub struct TerminalSurfaces {
    theme: ColorfulTheme,
}

impl TerminalSurfaces {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for TerminalSurfaces {
    fn default() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

fn prompt_error(e: dialoguer::Error) -> CapError {
    CapError::Other(format!("terminal prompt failed: {}", e))
}

impl SurfaceOps for TerminalSurfaces {
    fn pick_color_scheme(&self, schemes: &[ColorScheme]) -> CapResult<Option<String>> {
        if schemes.is_empty() {
            return Ok(None);
        }
        let items: Vec<String> = schemes
            .iter()
            .map(|s| format!("{} ({})", s.name, s.id))
            .collect();
        let current = schemes.iter().position(|s| s.selected).unwrap_or(0);
        let choice = Select::with_theme(&self.theme)
            .with_prompt("Color scheme")
            .items(&items)
            .default(current)
            .interact_opt()
            .map_err(prompt_error)?;
        Ok(choice.map(|i| schemes[i].id.clone()))
    }

    fn pick_schemas(&self, schemas: &[SchemaItem]) -> CapResult<Option<Vec<String>>> {
        if schemas.is_empty() {
            return Ok(None);
        }
        let items: Vec<String> = schemas
            .iter()
            .map(|s| format!("{} ({})", s.name, s.id))
            .collect();
        let checked: Vec<bool> = schemas.iter().map(|s| s.selected).collect();
        let chosen = MultiSelect::with_theme(&self.theme)
            .with_prompt("Schemas (space toggles, enter confirms)")
            .items(&items)
            .defaults(&checked)
            .interact_opt()
            .map_err(prompt_error)?;
        Ok(chosen.map(|idx| idx.into_iter().map(|i| schemas[i].id.clone()).collect()))
    }

    fn confirm_factory_reset(&self) -> CapResult<bool> {
        let answer = Confirm::with_theme(&self.theme)
            .with_prompt("Restore the factory configuration? User changes to shipped files are lost")
            .default(false)
            .interact_opt()
            .map_err(prompt_error)?;
        Ok(answer.unwrap_or(false))
    }

    fn show_licensing(&self, content: &str) -> CapResult<()> {
        // stderr keeps stdout reserved for the command result
        eprintln!("{}", content);
        Ok(())
    }
}
