//! Presence expressions for the climate scheduler
//!
//! A thin layer over minijinja that lets users describe "someone is home"
//! as a boolean predicate over live entity states.
//!
//! # State Access
//!
//! - `states('person.alex')` - status string
//! - `states.person.alex.state` - state object access
//! - `is_state('person.alex', 'home')` - status check (also accepts a list)
//! - `state_attr('device_tracker.phone', 'source_type')` - attribute value
//! - `has_value('binary_sensor.motion')` - neither unknown nor unavailable
//! - `count_state(['person.a', 'person.b'], 'home')` - how many match
//! - `now()` - current time fields (`hour`, `minute`, `weekday`, ...)
//!
//! # Result Coercion
//!
//! Booleans pass through, numbers are truthy when non-zero, and strings are
//! truthy when they match `true`, `yes`, `on`, `1` or `home`.
//!
//! # Example
//!
//! ```ignore
//! use cs_expression::ExpressionEngine;
//!
//! let engine = ExpressionEngine::new(state_machine);
//! let home = engine.evaluate_bool(
//!     "is_state('person.alex', 'home') or is_state('input_boolean.guests', 'on')",
//! )?;
//! ```

mod engine;
mod error;
mod filters;
mod states;
mod truthy;

pub use engine::ExpressionEngine;
pub use error::{ExpressionError, ExpressionResult};
pub use states::{StateWrapper, StatesObject};
pub use truthy::{coerce_bool, coerce_rendered, TRUTHY_STRINGS};

pub use minijinja::Value;
