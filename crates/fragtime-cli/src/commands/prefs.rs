use clap::Subcommand;
use fragtime_core::{DataAdapter, Difficulty, PreferencePatch, ValidationError};

use crate::context::{print_json, AppContext, CliResult};

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Print preferences as JSON
    Show,
    /// Change one preference
    Set {
        /// One of: categories, difficulty, notifications, task_reminder,
        /// completion_celebration, default_duration, theme_color, auto_pause
        key: String,
        /// New value (categories take a comma-separated list)
        value: String,
    },
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ValidationError> {
    match value {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(ValidationError::InvalidValue {
            field: key.to_string(),
            message: format!("expected true or false, got {other:?}"),
        }),
    }
}

/// Build the single-field patch for `key = value`.
pub(crate) fn patch_for(key: &str, value: &str) -> Result<PreferencePatch, ValidationError> {
    let mut patch = PreferencePatch::default();
    match key {
        "categories" | "preferred_categories" => {
            patch.preferred_categories = Some(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        "difficulty" | "difficulty_preference" => {
            patch.difficulty_preference = Some(value.parse::<Difficulty>()?);
        }
        "notifications" | "notifications_enabled" => {
            patch.notifications_enabled = Some(parse_bool(key, value)?);
        }
        "task_reminder" => patch.task_reminder = Some(parse_bool(key, value)?),
        "completion_celebration" => patch.completion_celebration = Some(parse_bool(key, value)?),
        "auto_pause" => patch.auto_pause = Some(parse_bool(key, value)?),
        "default_duration" => {
            let minutes = value
                .parse::<u32>()
                .ok()
                .filter(|m| *m > 0)
                .ok_or_else(|| ValidationError::InvalidValue {
                    field: key.to_string(),
                    message: format!("expected a positive number of minutes, got {value:?}"),
                })?;
            patch.default_duration = Some(minutes);
        }
        "theme_color" => patch.theme_color = Some(value.to_string()),
        other => {
            return Err(ValidationError::InvalidValue {
                field: other.to_string(),
                message: "unknown preference".to_string(),
            })
        }
    }
    Ok(patch)
}

pub async fn run(ctx: &AppContext, action: PrefsAction) -> CliResult {
    match action {
        PrefsAction::Show => print_json(&ctx.data.user_preferences().await?),
        PrefsAction::Set { key, value } => {
            let patch = patch_for(&key, &value)?;
            print_json(&ctx.data.update_user_preferences(&patch).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_split_on_commas() {
        let patch = patch_for("categories", "reading, chores,,email").unwrap();
        assert_eq!(
            patch.preferred_categories,
            Some(vec!["reading".into(), "chores".into(), "email".into()])
        );
    }

    #[test]
    fn difficulty_and_flags_parse() {
        assert_eq!(
            patch_for("difficulty", "hard").unwrap().difficulty_preference,
            Some(Difficulty::Hard)
        );
        assert_eq!(
            patch_for("notifications", "off").unwrap().notifications_enabled,
            Some(false)
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(patch_for("difficulty", "brutal").is_err());
        assert!(patch_for("auto_pause", "maybe").is_err());
        assert!(patch_for("default_duration", "0").is_err());
        assert!(patch_for("font", "serif").is_err());
    }
}
