use super::transitions::{ensure_editable, ensure_not_archived, LifecycleController};
use crate::controller::error::EngineError;
use crate::model::{
    ChangeSet, ContentItem, Experiment, OfferField, SubjectType, MAX_CONTENT_AMOUNT,
    MIN_CONTENT_AMOUNT,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Clamp a numeric content amount into [1, 2^53 - 1]
pub fn clamp_content_amount(amount: u64) -> u64 {
    amount.clamp(MIN_CONTENT_AMOUNT, MAX_CONTENT_AMOUNT)
}

/// Sanitize a free-text content amount
///
/// Non-digit characters are stripped before parsing; the result is clamped
/// into [1, 2^53 - 1]. Digit strings too long for u64 saturate at the maximum.
pub fn sanitize_content_amount(raw: &str) -> u64 {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return MIN_CONTENT_AMOUNT;
    }
    match digits.parse::<u64>() {
        Ok(amount) => clamp_content_amount(amount),
        Err(_) => MAX_CONTENT_AMOUNT,
    }
}

/// Coerce one JSON amount into a legal content amount
fn normalize_amount(value: &Value) -> Result<u64, EngineError> {
    match value {
        Value::Number(number) => {
            if let Some(amount) = number.as_u64() {
                return Ok(clamp_content_amount(amount));
            }
            // Negative or fractional: truncate, then clamp
            let amount = number.as_f64().unwrap_or(0.0);
            if amount < MIN_CONTENT_AMOUNT as f64 {
                Ok(MIN_CONTENT_AMOUNT)
            } else if amount >= MAX_CONTENT_AMOUNT as f64 {
                Ok(MAX_CONTENT_AMOUNT)
            } else {
                Ok(clamp_content_amount(amount.trunc() as u64))
            }
        }
        Value::String(raw) => Ok(sanitize_content_amount(raw)),
        Value::Null => Ok(MIN_CONTENT_AMOUNT),
        other => Err(EngineError::validation(format!(
            "content amount must be a number or numeric string, got {}",
            other
        ))),
    }
}

/// Normalize an offer content override
///
/// Accepts a list of `{ entityID, amount }` items where `amount` may be a
/// number or free text, and returns the list with every amount clamped.
pub fn normalize_content(value: &Value) -> Result<Vec<ContentItem>, EngineError> {
    let items = value
        .as_array()
        .ok_or_else(|| EngineError::validation("content override must be a list"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let object = item.as_object().ok_or_else(|| {
                EngineError::validation(format!("content[{}] must be an object", i))
            })?;
            let entity_id = object
                .get("entityID")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    EngineError::validation(format!("content[{}].entityID is required", i))
                })?;
            let amount = normalize_amount(object.get("amount").unwrap_or(&Value::Null))?;
            Ok(ContentItem {
                entity_id: entity_id.to_string(),
                amount,
            })
        })
        .collect()
}

fn content_to_value(content: Vec<ContentItem>) -> Value {
    Value::Array(
        content
            .into_iter()
            .map(|item| {
                let mut object = Map::new();
                object.insert("entityID".to_string(), Value::String(item.entity_id));
                object.insert("amount".to_string(), Value::from(item.amount));
                Value::Object(object)
            })
            .collect(),
    )
}

/// Check one override value against the subject type
///
/// Offer subjects take only `icon` (a string), `price` and `content`
/// (amounts clamped). Entity overrides are free-form.
fn normalize_override(
    subject_type: SubjectType,
    key: &str,
    value: Value,
) -> Result<Value, EngineError> {
    if subject_type != SubjectType::Offer {
        return Ok(value);
    }
    match OfferField::parse(key) {
        Some(OfferField::Content) => Ok(content_to_value(normalize_content(&value)?)),
        Some(OfferField::Icon) if !value.is_string() => {
            Err(EngineError::validation("icon override must be a string"))
        }
        Some(_) => Ok(value),
        None => Err(EngineError::validation(format!(
            "offer overrides are limited to icon, price and content, got '{}'",
            key
        ))),
    }
}

/// Validate and normalize every override of a ChangeSet in place
///
/// Returns true when a value was rewritten.
pub fn normalize_overrides(change_set: &mut ChangeSet) -> Result<bool, EngineError> {
    let keys: Vec<String> = change_set.overrides.keys().map(str::to_string).collect();
    let mut changed = false;
    for key in keys {
        let Some(value) = change_set.overrides.get(&key).cloned() else {
            continue;
        };
        let normalized = normalize_override(change_set.subject_type, &key, value.clone())?;
        if normalized != value {
            change_set.overrides.insert(key, normalized);
            changed = true;
        }
    }
    Ok(changed)
}

fn change_set_mut(
    experiment: &mut Experiment,
    index: usize,
) -> Result<&mut ChangeSet, EngineError> {
    let len = experiment.change_sets.len();
    experiment
        .change_sets
        .get_mut(index)
        .ok_or(EngineError::ChangeSetOutOfRange { index, len })
}

impl LifecycleController {
    /// Append an empty ChangeSet and return its index
    pub fn add_change_set(&self, experiment: &mut Experiment) -> Result<usize, EngineError> {
        ensure_editable(experiment, "add a change set")?;
        experiment
            .change_sets
            .push(ChangeSet::new(self.features.default_subject_type()));
        Ok(experiment.change_sets.len() - 1)
    }

    /// Remove a ChangeSet
    ///
    /// The last remaining ChangeSet can never be removed.
    pub fn remove_change_set(
        &self,
        experiment: &mut Experiment,
        index: usize,
    ) -> Result<ChangeSet, EngineError> {
        ensure_editable(experiment, "remove a change set")?;
        let len = experiment.change_sets.len();
        if index >= len {
            return Err(EngineError::ChangeSetOutOfRange { index, len });
        }
        if len == 1 {
            return Err(EngineError::invalid(format!(
                "cannot remove the only change set of experiment {}",
                experiment.id
            )));
        }
        Ok(experiment.change_sets.remove(index))
    }

    /// Change what kind of subject a ChangeSet targets
    ///
    /// A real change clears the subject and its overrides.
    pub fn set_subject_type(
        &self,
        experiment: &mut Experiment,
        index: usize,
        subject_type: SubjectType,
    ) -> Result<(), EngineError> {
        ensure_editable(experiment, "change subject type")?;
        if !self.features.allows_subject(subject_type) {
            return Err(EngineError::invalid(format!(
                "{} subjects are not available in this edition",
                subject_type
            )));
        }

        let change_set = change_set_mut(experiment, index)?;
        if change_set.subject_type != subject_type {
            change_set.subject_type = subject_type;
            change_set.subject_id.clear();
            change_set.overrides.clear();
        }
        Ok(())
    }

    /// Point a ChangeSet at another catalog subject
    ///
    /// A real change clears the overrides, which described the old subject.
    pub fn set_subject_id(
        &self,
        experiment: &mut Experiment,
        index: usize,
        subject_id: impl Into<String>,
    ) -> Result<(), EngineError> {
        ensure_editable(experiment, "change subject")?;
        let subject_id = subject_id.into();

        let change_set = change_set_mut(experiment, index)?;
        if change_set.subject_id != subject_id {
            change_set.subject_id = subject_id;
            change_set.overrides.clear();
        }
        Ok(())
    }

    /// Start overriding a field for the test arm
    ///
    /// Offer subjects accept `icon`, `price` and `content`, each once. The
    /// `content` override is seeded with a copy of the offer's current content
    /// so later catalog edits never leak into a defined experiment.
    pub fn add_override_field(
        &self,
        experiment: &mut Experiment,
        index: usize,
        key: &str,
    ) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "add an override")?;
        let change_set = change_set_mut(experiment, index)?;

        let key = key.trim();
        if key.is_empty() {
            return Err(EngineError::validation("override field key is empty"));
        }
        if change_set.overrides.is_overridden(key) {
            return Err(EngineError::invalid(format!(
                "field '{}' is already overridden",
                key
            )));
        }

        let seed = match change_set.subject_type {
            SubjectType::Offer => {
                let field = OfferField::parse(key).ok_or_else(|| {
                    EngineError::validation(format!(
                        "offer overrides are limited to icon, price and content, got '{}'",
                        key
                    ))
                })?;
                match field {
                    OfferField::Icon => Value::String(String::new()),
                    OfferField::Price => self
                        .catalog
                        .price(&change_set.subject_id)
                        .unwrap_or(Value::Null),
                    OfferField::Content => {
                        let baseline = self.catalog.content(&change_set.subject_id);
                        if baseline.is_none() {
                            debug!(
                                offer = %change_set.subject_id,
                                "Offer not in catalog, seeding empty content"
                            );
                        }
                        content_to_value(baseline.unwrap_or_default())
                    }
                }
            }
            SubjectType::Entity => Value::Null,
        };

        change_set.overrides.insert(key, seed);
        Ok(())
    }

    /// Stop overriding a field; other fields are untouched
    pub fn remove_override_field(
        &self,
        experiment: &mut Experiment,
        index: usize,
        key: &str,
    ) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "remove an override")?;
        let change_set = change_set_mut(experiment, index)?;
        if change_set.overrides.remove(key).is_none() {
            return Err(EngineError::invalid(format!(
                "field '{}' is not overridden",
                key
            )));
        }
        Ok(())
    }

    /// Set the test-arm value of an overridden field
    ///
    /// Legal in every lifecycle state except Archived. Offer content is
    /// normalized (amounts clamped); offer icons must be strings.
    pub fn set_override_value(
        &self,
        experiment: &mut Experiment,
        index: usize,
        key: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        ensure_not_archived(experiment, "change an override")?;
        let experiment_id = experiment.id.clone();
        let change_set = change_set_mut(experiment, index)?;
        if !change_set.overrides.is_overridden(key) {
            return Err(EngineError::invalid(format!(
                "field '{}' is not overridden; add it first",
                key
            )));
        }

        let normalized = normalize_override(change_set.subject_type, key, value.clone())?;
        if normalized != value {
            warn!(
                experiment = %experiment_id,
                offer = %change_set.subject_id,
                "Content amounts sanitized"
            );
        }

        change_set.overrides.insert(key, normalized);
        Ok(())
    }
}
