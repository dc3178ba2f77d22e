pub mod protocol;
pub mod sanitize;
pub mod session;
pub mod stream;

pub use protocol::{parse_event, LineBuffer, ScriptEvent, EVENT_PREFIX};
pub use sanitize::clean_script;
pub use session::{NullSink, ScriptSession, ScriptSink, SessionState};
pub use stream::{ScriptOutcome, ScriptRequest, ScriptStreamClient, ScriptStreamError, Tone};
