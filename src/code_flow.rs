use serde::Serialize;
use serde_sarif::sarif::{
    CodeFlow as SarifCodeFlow, ThreadFlow as SarifThreadFlow,
    ThreadFlowLocation as SarifThreadFlowLocation,
};

use crate::location::{Location, LocationFactory};
use crate::message::render_message;
use crate::model::{Importance, Message, wire_str};
use crate::run_info::RunInfo;

/// Nesting level recorded when a step does not supply one.
pub(crate) const NO_NESTING: i64 = -1;

const RETURN_CALL_TEXT: &str = "[return call]";
const NO_DESCRIPTION_TEXT: &str = "[no description]";

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CodeFlow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<Message>,
    pub(crate) thread_flows: Vec<ThreadFlow>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThreadFlow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<Message>,
    pub(crate) steps: Vec<CodeFlowStep>,
    /// Synthetic indent levels to put in front of the first step.
    pub(crate) lvls_first_step_is_nested: u32,
}

/// One step of a thread flow. Only `location` changes after construction.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CodeFlowStep {
    pub(crate) step_number: usize,
    pub(crate) traversal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) location: Option<Location>,
    pub(crate) message: Message,
    pub(crate) nesting_level: i64,
    pub(crate) is_parent: bool,
    pub(crate) is_last_child: bool,
    pub(crate) importance: Importance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) before_icon: Option<StepIcon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) execution_order: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) kinds: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) module: Option<String>,
}

/// Marker drawn before a step in a call tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum StepIcon {
    CallNoReturn,
    CallWithReturn,
    ReturnNoCall,
    ReturnWithCall,
}

/// Position of a step addressed by a traversal id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct TraversalId {
    pub(crate) code_flow: usize,
    pub(crate) thread_flow: usize,
    pub(crate) step: usize,
}

impl TraversalId {
    pub(crate) fn format(self) -> String {
        format!("{}_{}_{}", self.code_flow, self.thread_flow, self.step)
    }
}

/// Parse a `{codeFlow}_{threadFlow}_{step}` traversal id.
pub(crate) fn parse_code_flow_id(id: &str) -> Option<TraversalId> {
    if id == "-1" {
        return None;
    }
    let parts: Vec<&str> = id.split('_').collect();
    let [code_flow, thread_flow, step] = parts.as_slice() else {
        return None;
    };
    Some(TraversalId {
        code_flow: code_flow.parse().ok()?,
        thread_flow: thread_flow.parse().ok()?,
        step: step.parse().ok()?,
    })
}

/// Follow `index` into the run's shared thread-flow locations.
fn resolve_indirection<'a>(
    location: &'a SarifThreadFlowLocation,
    run: &'a RunInfo,
) -> &'a SarifThreadFlowLocation {
    location
        .index
        .and_then(|index| usize::try_from(index).ok())
        .and_then(|index| run.thread_flow_locations.get(index))
        .unwrap_or(location)
}

/// Build the canonical code flows of one result, in declaration order.
pub(crate) fn create_code_flows(
    factory: &mut LocationFactory<'_>,
    code_flows: &[SarifCodeFlow],
) -> Vec<CodeFlow> {
    code_flows
        .iter()
        .enumerate()
        .map(|(code_flow_index, code_flow)| CodeFlow {
            message: code_flow
                .message
                .as_ref()
                .map(|message| render_message(message, None)),
            thread_flows: code_flow
                .thread_flows
                .iter()
                .enumerate()
                .map(|(thread_flow_index, thread_flow)| {
                    create_thread_flow(factory, thread_flow, code_flow_index, thread_flow_index)
                })
                .collect(),
        })
        .collect()
}

fn create_thread_flow(
    factory: &mut LocationFactory<'_>,
    thread_flow: &SarifThreadFlow,
    code_flow_index: usize,
    thread_flow_index: usize,
) -> ThreadFlow {
    let run = factory.run();
    let resolved: Vec<&SarifThreadFlowLocation> = thread_flow
        .locations
        .iter()
        .map(|location| resolve_indirection(location, run))
        .collect();
    let levels: Vec<Option<i64>> = resolved.iter().map(|location| location.nesting_level).collect();

    let mut steps = Vec::with_capacity(resolved.len());
    for (step_index, location) in resolved.iter().enumerate() {
        let own = levels[step_index];
        let next = levels.get(step_index + 1).copied().flatten();
        let has_next = step_index + 1 < levels.len();
        let (is_parent, is_last_child) = if has_next {
            compare_levels(own, next)
        } else {
            (false, false)
        };

        let message = location
            .location
            .as_ref()
            .and_then(|location| location.message.as_ref())
            .map(|message| render_message(message, None))
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| {
                let fallback = if is_last_child {
                    RETURN_CALL_TEXT
                } else {
                    NO_DESCRIPTION_TEXT
                };
                Message {
                    text: fallback.to_string(),
                    html: fallback.to_string(),
                }
            });

        steps.push(CodeFlowStep {
            step_number: step_index + 1,
            traversal_id: TraversalId {
                code_flow: code_flow_index,
                thread_flow: thread_flow_index,
                step: step_index,
            }
            .format(),
            location: location
                .location
                .as_ref()
                .map(|location| factory.create(location)),
            message,
            nesting_level: own.unwrap_or(NO_NESTING),
            is_parent,
            is_last_child,
            importance: Importance::parse(wire_str(&location.importance).as_deref()),
            before_icon: None,
            execution_order: location.execution_order,
            kinds: location.kinds.clone().unwrap_or_default(),
            module: location.module.clone(),
        });
    }

    for index in 0..steps.len() {
        steps[index].before_icon = get_before_icon(&steps, index);
    }

    let any_undefined = levels.iter().any(Option::is_none);
    let any_zero = levels.iter().any(|level| *level == Some(0));
    let lvls_first_step_is_nested = steps.first().map_or(0, |first| {
        levels_first_step_is_nested(first.nesting_level, any_undefined, any_zero)
    });

    ThreadFlow {
        id: thread_flow.id.clone(),
        message: thread_flow
            .message
            .as_ref()
            .map(|message| render_message(message, None)),
        steps,
        lvls_first_step_is_nested,
    }
}

/// `(is_parent, is_last_child)` from a step's level and the next step's.
///
/// A missing level counts as outside every defined level.
fn compare_levels(own: Option<i64>, next: Option<i64>) -> (bool, bool) {
    match (own, next) {
        (None, Some(_)) => (true, false),
        (Some(_), None) => (false, true),
        (Some(own), Some(next)) => (own < next, own > next),
        (None, None) => (false, false),
    }
}

/// Icon drawn before `steps[index]`, or `None` for a plain step.
pub(crate) fn get_before_icon(steps: &[CodeFlowStep], index: usize) -> Option<StepIcon> {
    let step = steps.get(index)?;
    if step.is_parent {
        let returns = steps[index + 1..]
            .iter()
            .any(|later| later.nesting_level <= step.nesting_level);
        return Some(if returns {
            StepIcon::CallWithReturn
        } else {
            StepIcon::CallNoReturn
        });
    }
    if step.is_last_child {
        let called = step.nesting_level != NO_NESTING
            && steps[..index]
                .iter()
                .rev()
                .any(|earlier| earlier.nesting_level < step.nesting_level);
        return Some(if called {
            StepIcon::ReturnWithCall
        } else {
            StepIcon::ReturnNoCall
        });
    }
    None
}

/// Indent levels for the first step of a thread flow.
///
/// Tools disagree on whether nesting starts at 0 or 1, or supply none at all;
/// the flags say whether any step of the thread has an undefined or a zero level.
pub(crate) fn levels_first_step_is_nested(first_level: i64, any_undefined: bool, any_zero: bool) -> u32 {
    match first_level {
        level if level < 0 => 0,
        0 => u32::from(any_undefined),
        level => {
            let base = u32::try_from(level - 1).unwrap_or(u32::MAX);
            base.saturating_add(u32::from(any_undefined))
                .saturating_add(u32::from(any_zero))
        }
    }
}

/// Retry every unmapped step location against the raw code flows.
///
/// Returns whether any step location changed.
pub(crate) fn remap_code_flows(
    factory: &mut LocationFactory<'_>,
    code_flows: &mut [CodeFlow],
    raw: &[SarifCodeFlow],
) -> bool {
    let run = factory.run();
    let mut changed = false;
    for (code_flow, raw_code_flow) in code_flows.iter_mut().zip(raw) {
        for (thread_flow, raw_thread_flow) in
            code_flow.thread_flows.iter_mut().zip(&raw_code_flow.thread_flows)
        {
            for (step, raw_step) in thread_flow.steps.iter_mut().zip(&raw_thread_flow.locations) {
                let Some(existing) = step.location.as_ref() else {
                    continue;
                };
                if existing.mapped {
                    continue;
                }
                let Some(raw_location) = resolve_indirection(raw_step, run).location.as_ref()
                else {
                    continue;
                };
                if let Some(remapped) = factory.get_or_remap(existing, raw_location) {
                    if remapped.mapped {
                        step.location = Some(remapped);
                        changed = true;
                    }
                }
            }
        }
    }
    changed
}
