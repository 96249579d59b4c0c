pub mod accumulator;
pub mod actions;
pub mod config;
pub mod correlator;
pub mod events;
pub mod paths;
pub mod persistence;
pub mod policy_engine;
pub mod reducer;
pub mod replay;
pub mod rules;
pub mod state;
pub mod tool_registry;
pub mod transcript;

pub use actions::*;
pub use reducer::*;
pub use state::*;

pub use config::Config;
pub use events::AgentEvent;
pub use events::PermissionDecision;
pub use events::TimedEvent;
pub use persistence::*;
pub use policy_engine::PermissionKind;
pub use policy_engine::PermissionPolicy;
pub use policy_engine::PermissionRequest;
pub use policy_engine::PermissionRule;
pub use replay::*;
pub use rules::*;
pub use transcript::*;
