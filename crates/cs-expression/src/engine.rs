//! Expression engine
//!
//! Evaluates user-authored presence predicates against live entity states.
//! Two forms are accepted: a bare expression (`is_state('person.alex',
//! 'home') or states('input_boolean.guests') == 'on'`) evaluated to a native
//! value, and a template (`{{ ... }}`) whose rendered text is coerced.

use crate::error::{ExpressionError, ExpressionResult};
use crate::filters;
use crate::states::{self, StatesObject};
use crate::truthy;
use chrono::{Datelike, Timelike};
use cs_core::{SharedClock, StateLookup, SystemClock};
use minijinja::{Environment, Value};
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

/// Time fields exposed through `now()`
#[derive(Debug, Serialize)]
struct NowValue {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    /// 0 = Monday
    weekday: u32,
    iso: String,
}

/// Expression engine bound to a state lookup
pub struct ExpressionEngine {
    env: Environment<'static>,
    states: Arc<StatesObject>,
}

impl ExpressionEngine {
    /// Create an engine reading time from the system clock
    pub fn new(lookup: Arc<dyn StateLookup>) -> Self {
        Self::with_clock(lookup, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit clock for `now()`
    pub fn with_clock(lookup: Arc<dyn StateLookup>, clock: SharedClock) -> Self {
        let states = Arc::new(StatesObject::new(lookup));
        let mut env = Environment::new();

        Self::register_filters(&mut env);
        Self::register_globals(&mut env, states.clone(), clock);
        Self::register_tests(&mut env);

        Self { env, states }
    }

    fn register_filters(env: &mut Environment<'static>) {
        env.add_filter("float", filters::to_float);
        env.add_filter("int", filters::to_int);
        env.add_filter("bool", filters::to_bool);
        env.add_filter("round", filters::round_filter);
        env.add_filter("abs", filters::abs_filter);
        env.add_filter("contains", filters::contains);
    }

    fn register_globals(env: &mut Environment<'static>, states: Arc<StatesObject>, clock: SharedClock) {
        env.add_global("states", Value::from_object((*states).clone()));

        let s = states.clone();
        env.add_function("is_state", move |entity_id: &str, state: Value| {
            states::is_state_fn(&s, entity_id, state)
        });

        let s = states.clone();
        env.add_function("state_attr", move |entity_id: &str, attribute: &str| {
            s.state_attr(entity_id, attribute)
        });

        let s = states.clone();
        env.add_function("has_value", move |entity_id: &str| s.has_value(entity_id));

        let s = states;
        env.add_function("count_state", move |entity_ids: Value, state: &str| {
            let count = entity_ids
                .try_iter()
                .map(|iter| {
                    iter.filter(|id| id.as_str().map(|id| s.is_state(id, state)).unwrap_or(false))
                        .count()
                })
                .unwrap_or(0);
            Value::from(count)
        });

        env.add_function("now", move || {
            let now = clock.now();
            Value::from_serialize(NowValue {
                year: now.year(),
                month: now.month(),
                day: now.day(),
                hour: now.hour(),
                minute: now.minute(),
                weekday: now.weekday().num_days_from_monday(),
                iso: now.to_rfc3339(),
            })
        });
    }

    fn register_tests(env: &mut Environment<'static>) {
        env.add_test("number", filters::is_number);
        env.add_test("contains", filters::contains);
    }

    /// Whether the text uses template delimiters rather than a bare expression
    pub fn is_template(source: &str) -> bool {
        source.contains("{{") || source.contains("{%") || source.contains("{#")
    }

    /// Check that an expression compiles without evaluating it
    pub fn validate(&self, source: &str) -> ExpressionResult<()> {
        let source = Self::non_empty(source)?;
        if Self::is_template(source) {
            self.env.template_from_str(source)?;
        } else {
            self.env.compile_expression(source)?;
        }
        Ok(())
    }

    /// Evaluate a bare expression to its native value
    pub fn evaluate(&self, source: &str) -> ExpressionResult<Value> {
        let source = Self::non_empty(source)?;
        let expr = self.env.compile_expression(source)?;
        Ok(expr.eval(())?)
    }

    /// Render a template to text
    pub fn render(&self, source: &str) -> ExpressionResult<String> {
        let tmpl = self.env.template_from_str(source)?;
        Ok(tmpl.render(())?)
    }

    /// Evaluate either form and coerce the result to a boolean
    pub fn evaluate_bool(&self, source: &str) -> ExpressionResult<bool> {
        let source = Self::non_empty(source)?;
        let result = if Self::is_template(source) {
            let rendered = self.render(source)?;
            trace!(%rendered, "Rendered presence template");
            truthy::coerce_rendered(&rendered)
        } else {
            let value = self.evaluate(source)?;
            trace!(%value, "Evaluated presence expression");
            truthy::coerce_bool(&value)
        };
        Ok(result)
    }

    pub fn states(&self) -> &StatesObject {
        &self.states
    }

    fn non_empty(source: &str) -> ExpressionResult<&str> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            Err(ExpressionError::Empty)
        } else {
            Ok(trimmed)
        }
    }
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use cs_core::{Context, EntityId, MockClock};
    use cs_event_bus::EventBus;
    use cs_state_machine::StateMachine;
    use std::collections::HashMap;

    fn make_test_engine() -> ExpressionEngine {
        let state_machine = Arc::new(StateMachine::new(Arc::new(EventBus::new())));
        state_machine.set(
            EntityId::new("person", "alex").unwrap(),
            "home",
            HashMap::new(),
            Context::new(),
        );
        state_machine.set(
            EntityId::new("person", "sam").unwrap(),
            "not_home",
            HashMap::new(),
            Context::new(),
        );
        state_machine.set(
            EntityId::new("sensor", "occupancy").unwrap(),
            "3",
            HashMap::new(),
            Context::new(),
        );
        let clock = MockClock::at(Local.with_ymd_and_hms(2026, 3, 4, 22, 15, 0).unwrap());
        ExpressionEngine::with_clock(state_machine, Arc::new(clock))
    }

    #[test]
    fn test_bare_expression_bool() {
        let engine = make_test_engine();
        assert!(engine.evaluate_bool("is_state('person.alex', 'home')").unwrap());
        assert!(!engine.evaluate_bool("is_state('person.sam', 'home')").unwrap());
        assert!(engine
            .evaluate_bool("is_state('person.sam', ['home', 'not_home'])")
            .unwrap());
    }

    #[test]
    fn test_native_string_result_is_coerced() {
        let engine = make_test_engine();
        assert!(engine.evaluate_bool("states('person.alex')").unwrap());
        assert!(!engine.evaluate_bool("states('person.sam')").unwrap());
    }

    #[test]
    fn test_numeric_results() {
        let engine = make_test_engine();
        assert!(engine.evaluate_bool("states('sensor.occupancy') | int").unwrap());
        assert!(!engine.evaluate_bool("states('sensor.occupancy') | int - 3").unwrap());
        assert!(engine
            .evaluate_bool("count_state(['person.alex', 'person.sam'], 'home')")
            .unwrap());
    }

    #[test]
    fn test_template_form() {
        let engine = make_test_engine();
        assert!(engine
            .evaluate_bool("{{ is_state('person.alex', 'home') }}")
            .unwrap());
        assert!(!engine.evaluate_bool("{{ 'away' }}").unwrap());
    }

    #[test]
    fn test_state_object_access() {
        let engine = make_test_engine();
        assert!(engine
            .evaluate_bool("states.person.alex.state == 'home'")
            .unwrap());
        assert!(!engine.evaluate_bool("states.person.nobody").unwrap());
    }

    #[test]
    fn test_now_uses_clock() {
        let engine = make_test_engine();
        assert!(engine.evaluate_bool("now().hour >= 22").unwrap());
        assert_eq!(engine.evaluate("now().weekday").unwrap().as_i64(), Some(2));
    }

    #[test]
    fn test_validate_and_errors() {
        let engine = make_test_engine();
        assert!(engine.validate("is_state('person.alex', 'home')").is_ok());
        assert!(engine.validate("{{ states('person.alex') }}").is_ok());
        assert_eq!(engine.validate("   "), Err(ExpressionError::Empty));
        assert!(matches!(
            engine.validate("is_state('person.alex',"),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(engine.evaluate_bool("no_such_function()").is_err());
    }
}
