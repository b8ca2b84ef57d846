//! Where perception input comes from. The agent does not care which
//! source is plugged in as long as it yields [`RawPerception`].

use std::collections::VecDeque;
use std::io::BufRead;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::BioGuardResult;
use crate::types::{PerceptionFrame, Posture, RawPerception};

pub trait PerceptionSource {
    /// `None` once the source is exhausted. An `Err` rejects one sample
    /// and the caller keeps polling.
    fn next_perception(&mut self, now_ms: u64) -> Option<BioGuardResult<RawPerception>>;
}

/// Replays a fixed list of inputs, then stops.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    script: VecDeque<RawPerception>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = RawPerception>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn from_frames(frames: impl IntoIterator<Item = PerceptionFrame>) -> Self {
        Self::new(frames.into_iter().map(RawPerception::from))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl PerceptionSource for ScriptedSource {
    fn next_perception(&mut self, _now_ms: u64) -> Option<BioGuardResult<RawPerception>> {
        self.script.pop_front().map(Ok)
    }
}

/// Randomised stand-in for a camera pipeline, used for demos. Each draw
/// either switches the scene (fall, someone moving about, empty room) or
/// repeats the previous scene with a fresh timestamp.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    rng: StdRng,
    fall_chance: f64,
    active_chance: f64,
    empty_chance: f64,
    scene: (bool, bool, Posture),
}

impl SimulatedSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            fall_chance: 0.01,
            active_chance: 0.05,
            empty_chance: 0.30,
            scene: (false, false, Posture::Unknown),
        }
    }

    pub fn with_fall_chance(mut self, chance: f64) -> Self {
        self.fall_chance = chance.clamp(0.0, 1.0);
        self
    }
}

impl PerceptionSource for SimulatedSource {
    fn next_perception(&mut self, now_ms: u64) -> Option<BioGuardResult<RawPerception>> {
        let roll: f64 = self.rng.gen();
        if roll < self.fall_chance {
            self.scene = (false, true, Posture::Fallen);
        } else if roll < self.fall_chance + self.active_chance {
            self.scene = (true, true, Posture::Standing);
        } else if roll < self.fall_chance + self.active_chance + self.empty_chance {
            self.scene = (false, false, Posture::Unknown);
        }

        let (movement, has_person, posture) = self.scene;
        Some(Ok(RawPerception::from(PerceptionFrame::new(
            movement, has_person, posture, now_ms,
        ))))
    }
}

/// Newline-delimited JSON from an external capture process, one
/// [`RawPerception`] per line. Blank lines are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> PerceptionSource for JsonLinesSource<R> {
    fn next_perception(&mut self, _now_ms: u64) -> Option<BioGuardResult<RawPerception>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    let text = self.line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(text).map_err(Into::into));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
