use serde::Serialize;
use serde_sarif::sarif::{
    Attachment as SarifAttachment, Location as SarifLocation, Result as SarifResult,
    Stack as SarifStack,
};

use crate::code_flow::{CodeFlow, create_code_flows, remap_code_flows};
use crate::error::SarifError;
use crate::location::{Location, LocationFactory};
use crate::message::render_message;
use crate::model::{Level, Message, Severity, wire_str};

const UNMAPPED_PREFIX: &str = "[Unmapped] ";

/// One SARIF result, flattened for display.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultInfo {
    pub(crate) id: usize,
    pub(crate) run_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rule_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rule_help_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rule_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) baseline_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rank: Option<f64>,
    pub(crate) level: Level,
    pub(crate) severity: Severity,
    message: Message,
    #[serde(skip)]
    raw_message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    assigned_location: Option<Location>,
    pub(crate) locations: Vec<Location>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) related_locations: Vec<Location>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) code_flows: Vec<CodeFlow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) stacks: Vec<Stack>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) location_in_sarif_file: Option<Location>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Stack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<Message>,
    pub(crate) frames: Vec<StackFrame>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StackFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) parameters: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<Message>,
    pub(crate) location: Location,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) regions: Vec<Location>,
}

impl ResultInfo {
    /// Build the display model of `result`, the `index`-th result of the
    /// factory's run.
    pub(crate) fn create(
        factory: &mut LocationFactory<'_>,
        result: &SarifResult,
        index: usize,
        location_in_sarif_file: Option<Location>,
    ) -> Result<Self, SarifError> {
        let run = factory.run();
        let rule = run.rule(result.rule_index, result.rule_id.as_deref());

        let raw_message = render_message(&result.message, rule);
        let locations: Vec<Location> = result
            .locations
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|location| factory.create(location))
            .collect();
        let assigned_location = locations.first().cloned().or_else(|| {
            result
                .analysis_target
                .as_ref()
                .map(|target| factory.create_from_artifact(target, None))
        });
        if assigned_location.is_none() && raw_message.is_empty() {
            return Err(SarifError::UnrepresentableResult { run: run.id, index });
        }

        let related_locations = result
            .related_locations
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|location| factory.create(location))
            .collect();
        let code_flows = create_code_flows(factory, result.code_flows.as_deref().unwrap_or_default());
        let stacks = result
            .stacks
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|stack| create_stack(factory, stack))
            .collect();
        let attachments = result
            .attachments
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|attachment| create_attachment(factory, attachment))
            .collect();

        let result_level = wire_str(&result.level).or_else(|| {
            rule.and_then(|rule| rule.default_configuration.as_ref())
                .and_then(|configuration| wire_str(&configuration.level))
        });
        let level = Level::parse(result_level.as_deref());

        let mut info = Self {
            id: index,
            run_id: run.id,
            rule_id: result
                .rule_id
                .clone()
                .or_else(|| rule.map(|rule| rule.id.clone())),
            rule_name: rule.and_then(|rule| rule.name.clone()),
            rule_help_uri: rule.and_then(|rule| rule.help_uri.clone()),
            rule_description: rule.and_then(|rule| {
                rule.short_description
                    .as_ref()
                    .or(rule.full_description.as_ref())
                    .map(|description| description.text.clone())
            }),
            kind: wire_str(&result.kind),
            baseline_state: wire_str(&result.baseline_state),
            rank: result.rank,
            level,
            severity: level.severity(),
            message: Message::default(),
            raw_message,
            assigned_location: None,
            locations,
            related_locations,
            code_flows,
            stacks,
            attachments,
            location_in_sarif_file,
        };
        info.set_assigned(assigned_location);
        Ok(info)
    }

    /// Displayed message, prefixed while the result is unmapped.
    pub(crate) fn message(&self) -> &Message {
        &self.message
    }

    pub(crate) fn assigned_location(&self) -> Option<&Location> {
        self.assigned_location.as_ref()
    }

    pub(crate) fn is_mapped(&self) -> bool {
        self.assigned_location
            .as_ref()
            .is_some_and(|location| location.mapped)
    }

    /// Replace the assigned location and recompute the message prefix.
    pub(crate) fn resolve(&mut self, location: Location) {
        self.set_assigned(Some(location));
    }

    fn set_assigned(&mut self, location: Option<Location>) {
        self.assigned_location = location;
        self.message = if self.is_mapped() {
            self.raw_message.clone()
        } else {
            Message {
                text: format!("{UNMAPPED_PREFIX}{}", self.raw_message.text),
                html: format!("{UNMAPPED_PREFIX}{}", self.raw_message.html),
            }
        };
    }

    /// Retry every unmapped location of this result.
    ///
    /// Returns whether the assigned location became mapped. Locations that
    /// were mapped before are kept as they are.
    pub(crate) fn remap(&mut self, factory: &mut LocationFactory<'_>, raw: &SarifResult) -> bool {
        let raw_locations = raw.locations.as_deref().unwrap_or_default();
        remap_locations(factory, &mut self.locations, raw_locations);
        let raw_related = raw.related_locations.as_deref().unwrap_or_default();
        remap_locations(factory, &mut self.related_locations, raw_related);
        remap_code_flows(
            factory,
            &mut self.code_flows,
            raw.code_flows.as_deref().unwrap_or_default(),
        );

        if self.is_mapped() {
            return false;
        }
        let candidate = match self.locations.first() {
            Some(first) => Some(first.clone()),
            None => raw
                .analysis_target
                .as_ref()
                .map(|target| factory.create_from_artifact(target, None)),
        };
        match candidate {
            Some(candidate) if candidate.mapped => {
                self.resolve(candidate);
                true
            }
            _ => false,
        }
    }
}

fn remap_locations(
    factory: &mut LocationFactory<'_>,
    locations: &mut [Location],
    raw: &[SarifLocation],
) {
    for (location, raw_location) in locations.iter_mut().zip(raw) {
        if let Some(remapped) = factory.get_or_remap(location, raw_location) {
            if remapped.mapped {
                *location = remapped;
            }
        }
    }
}

fn create_stack(factory: &mut LocationFactory<'_>, stack: &SarifStack) -> Stack {
    Stack {
        message: stack
            .message
            .as_ref()
            .map(|message| render_message(message, None)),
        frames: stack
            .frames
            .iter()
            .map(|frame| StackFrame {
                location: frame
                    .location
                    .as_ref()
                    .map(|location| factory.create(location)),
                module: frame.module.clone(),
                thread_id: frame.thread_id,
                parameters: frame.parameters.clone().unwrap_or_default(),
            })
            .collect(),
    }
}

fn create_attachment(factory: &mut LocationFactory<'_>, attachment: &SarifAttachment) -> Attachment {
    let artifact = &attachment.artifact_location;
    Attachment {
        description: attachment
            .description
            .as_ref()
            .map(|message| render_message(message, None)),
        location: factory.create_from_artifact(artifact, None),
        regions: attachment
            .regions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|region| factory.create_from_artifact(artifact, Some(region)))
            .collect(),
    }
}
