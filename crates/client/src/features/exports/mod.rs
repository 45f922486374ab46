//! Export features: combat-sim, Milkonomy, and the character-sheet URL.
//!
//! Payload shapes are pinned in `toolasha_protocol::exports`; these
//! features only assemble them from live state and hand them to the
//! clipboard port.

mod character_sheet;
mod combat_sim;
mod milkonomy;

pub use character_sheet::CharacterSheetLink;
pub use combat_sim::CombatSimExportFeature;
pub use milkonomy::MilkonomyExportFeature;

use toolasha_domain::CharacterState;
use toolasha_protocol::SharedProfile;

/// Lift a shared profile into a character-state shape so the export
/// builders can treat own and foreign loadouts uniformly.
pub(crate) fn profile_to_state(profile: &SharedProfile) -> CharacterState {
    let mut state = CharacterState::default();
    state.character.name = profile.character_name.clone();
    state.skills = profile.skills.clone();
    state.inventory = profile.equipment.clone();
    state.abilities = profile.abilities.clone();
    state.house_room_map = profile.house_room_map.clone();
    state
}
