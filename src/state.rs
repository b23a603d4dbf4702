use crate::services::pattern_state::SharedPatternState;

#[derive(Clone)]
pub struct AppState {
    pub pattern_state: SharedPatternState,
}
