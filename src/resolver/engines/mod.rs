// Engines - one module per upstream source
//
// Tier 1 (raced): native watch page, Invidious mirrors, Cobalt
// Tier 2 (sequential): yt-dlp
//
// `ScriptedEngine` has no upstream; it replays a fixed behavior and is used
// to drive the scheduler in tests and dry runs.

mod cobalt;
mod invidious;
mod native;
mod scripted;
mod ytdlp;

pub use cobalt::CobaltEngine;
pub use invidious::InvidiousEngine;
pub use native::NativePageEngine;
pub use scripted::{Script, ScriptedEngine};
pub use ytdlp::YtDlpEngine;
