//! Controller script generation for sort programs.
//!
//! # Responsibility
//! - Build program bodies for the item-sorter motion sequence.
//! - Substitute simulated or physical gripper control text.
//! - Provide the fixed ping (wave) and assembly-to-output programs.
//!
//! # Invariants
//! - Output depends only on `(class, repeat, sim)`.
//! - Bodies are never wrapped in `def`/`end`; the link does that.
//! - Repeat counts below one are clamped to one.

use crate::model::item::{Item, LOCATION_BLACK_SHELL, LOCATION_WHITE_SHELL};
use crate::robot::pose::{self, Pose};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TAG_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s_\-]+").expect("valid tag separator regex"));

/// Item class understood by the sorter program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortClass {
    /// Picked from slot A.
    WhiteShell,
    /// Picked from slot B.
    BlackShell,
    /// One white and one black cycle per repeat.
    Mixed,
}

impl SortClass {
    /// Class used when a tag or location cannot be resolved.
    pub const DEFAULT: SortClass = SortClass::WhiteShell;

    pub fn tag(self) -> &'static str {
        match self {
            Self::WhiteShell => "white_shell",
            Self::BlackShell => "black_shell",
            Self::Mixed => "mixed",
        }
    }

    /// Label shown on the controller pendant.
    pub fn label(self) -> &'static str {
        match self {
            Self::WhiteShell => "WHITE SHELL (A)",
            Self::BlackShell => "BLACK SHELL (B)",
            Self::Mixed => "MIXED (A+B)",
        }
    }

    /// Parses `white_shell`, `White Shell`, `black-shell`, `mixed`, ...
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let normalized = TAG_SEPARATOR_RE
            .replace_all(tag.trim(), "_")
            .to_ascii_lowercase();
        match normalized.as_str() {
            "white_shell" | "white" | "a" => Some(Self::WhiteShell),
            "black_shell" | "black" | "b" => Some(Self::BlackShell),
            "mixed" | "mix" => Some(Self::Mixed),
            _ => None,
        }
    }

    /// Resolves a tag, falling back to [`SortClass::DEFAULT`].
    ///
    /// Dispatch must not block on an unknown tag; callers that need strict
    /// validation use [`SortClass::parse_tag`] first.
    pub fn from_tag_or_default(tag: &str) -> Self {
        Self::parse_tag(tag).unwrap_or_else(|| {
            warn!(
                "event=sort_class_fallback module=robot status=warn source=tag fallback={}",
                Self::DEFAULT.tag()
            );
            Self::DEFAULT
        })
    }

    /// Resolves the class for an inventory item: its tag first, then its location.
    pub fn for_item(item: &Item) -> Self {
        match item.class_tag.as_deref() {
            Some(tag) => Self::from_tag_or_default(tag),
            None => Self::for_location(item.location),
        }
    }

    /// Resolves the class picked from an inventory location.
    pub fn for_location(location: u32) -> Self {
        match location {
            LOCATION_WHITE_SHELL => Self::WhiteShell,
            LOCATION_BLACK_SHELL => Self::BlackShell,
            other => {
                warn!(
                    "event=sort_class_fallback module=robot status=warn source=location location={} fallback={}",
                    other,
                    Self::DEFAULT.tag()
                );
                Self::DEFAULT
            }
        }
    }
}

const GRIPPER_FUNCTIONS_SIM: &str = r#"  # --- Gripper stub (simulator) ---
  def rg_grip(width, force = 10):
    sleep(0.05)
  end
"#;

const GRIPPER_FUNCTIONS_REAL: &str = r#"  # --- RG2 gripper via XML-RPC ---
  global RPC = rpc_factory("xmlrpc", "http://localhost:41414")
  global TOOL_INDEX = 0

  def rg_is_busy():
    return RPC.rg_get_busy(TOOL_INDEX)
  end

  # width: [0..110], force: [0..40]
  def rg_grip(width, force = 10):
    RPC.rg_grip(TOOL_INDEX, width + .0, force + .0)
    sleep(0.01)
    while (rg_is_busy()):
      # wait
    end
  end
"#;

const WAVE: &str = r#"  textmsg("PING/WAVE")
  home = [0, -1.57, 0, -1.57, 0, 0]
  left = p[0.25, -0.25, 0.20, 0, -3.1415, 0]
  right = p[0.25, 0.25, 0.20, 0, -3.1415, 0]
  movej(home, a=1.2, v=0.6)
  i = 0
  while (i < 3):
    movej(get_inverse_kin(left), a=1.2, v=0.6)
    movej(get_inverse_kin(right), a=1.2, v=0.6)
    i = i + 1
  end
"#;

/// Gripper helper definitions for the simulator or the physical RG2.
pub fn gripper_functions(sim: bool) -> &'static str {
    if sim {
        GRIPPER_FUNCTIONS_SIM
    } else {
        GRIPPER_FUNCTIONS_REAL
    }
}

/// Fixed ping program; independent of the sim flag.
pub fn wave() -> &'static str {
    WAVE
}

/// Builds the item-sorter program for `class`, repeated `repeat` times.
pub fn item_sorter(class: SortClass, repeat: u32, sim: bool) -> String {
    let repeat = repeat.max(1);
    let mut script = ScriptBuilder::new();

    script.line(&format!(
        "textmsg(\"ItemSorter: {} x{}\")",
        class.label(),
        repeat
    ));
    script.blank();
    script.raw(gripper_functions(sim));
    script.blank();
    script.line("# Gripper parameters");
    script.line("open_mm = 60");
    script.line("open_pick_mm = 85");
    script.line("close_mm = 31");
    script.line("f_open = 30");
    script.line("f_close = 30");
    script.blank();
    script.line("# Poses");
    script.pose("p_start", &pose::START);
    script.pose("p_A_10", &pose::A_ABOVE);
    script.pose("p_A_0", &pose::A_PICK);
    script.pose("p_B_10", &pose::B_ABOVE);
    script.pose("p_B_0", &pose::B_PICK);
    script.pose("p_C_10", &pose::C_ABOVE);
    script.pose("p_C_0", &pose::C_DEPTH);
    script.pose("p_C_2", &pose::C_SHALLOW);
    script.pose("p_D_10", &pose::D_ABOVE);
    script.pose("p_D_0", &pose::D_DEPTH);
    script.pose("p_E_10", &pose::E_ABOVE);
    script.pose("p_E_0", &pose::E_DEPTH);
    script.blank();
    script.line("# Safe start: gripper closed, then home");
    script.grip("close_mm", "f_close");
    script.movel("p_start", Speed::Start);

    let cycle = sort_cycle(class);
    for index in 1..=repeat {
        script.blank();
        script.line(&format!("# cycle {index}/{repeat}"));
        script.raw(&cycle);
    }

    script.blank();
    script.line(&format!("textmsg(\"DONE: {}\")", class.label()));
    script.finish()
}

/// Builds the sorter program for a free-form class tag.
///
/// Unknown tags use the default class sequence.
pub fn item_sorter_for_tag(tag: &str, repeat: u32, sim: bool) -> String {
    item_sorter(SortClass::from_tag_or_default(tag), repeat, sim)
}

/// Motion text for one repeat of `class`.
///
/// `Mixed` is exactly the white cycle followed by the black cycle.
pub fn sort_cycle(class: SortClass) -> String {
    match class {
        SortClass::WhiteShell => single_cycle(PickSlot::A),
        SortClass::BlackShell => single_cycle(PickSlot::B),
        SortClass::Mixed => {
            let mut cycle = single_cycle(PickSlot::A);
            cycle.push_str(&single_cycle(PickSlot::B));
            cycle
        }
    }
}

/// Short transfer from the assembly station (C) to the output tray (D).
pub fn assembly_to_output(sim: bool) -> String {
    let mut script = ScriptBuilder::new();
    script.line("textmsg(\"Assembly -> Output\")");
    script.blank();
    script.raw(gripper_functions(sim));
    script.blank();
    script.line("open_mm = 60");
    script.line("close_mm = 24");
    script.line("f_open = 30");
    script.line("f_close = 30");
    script.blank();
    script.line("# Assembly = C, Output = D");
    script.pose("p_asm_10", &pose::C_ABOVE);
    script.pose("p_asm_0", &pose::C_DEPTH);
    script.pose("p_out_10", &pose::D_ABOVE);
    script.pose("p_out_0", &pose::D_DEPTH);
    script.blank();
    script.movel("p_asm_10", Speed::Approach);
    script.movel("p_asm_0", Speed::Fine);
    script.grip("close_mm", "f_close");
    script.movel("p_asm_10", Speed::Fine);
    script.movel("p_out_10", Speed::Approach);
    script.movel("p_out_0", Speed::Fine);
    script.grip("open_mm", "f_open");
    script.movel("p_out_10", Speed::Fine);
    script.blank();
    script.line("textmsg(\"DONE: Assembly -> Output\")");
    script.finish()
}

#[derive(Debug, Clone, Copy)]
enum PickSlot {
    A,
    B,
}

impl PickSlot {
    fn label(self) -> &'static str {
        match self {
            Self::A => SortClass::WhiteShell.label(),
            Self::B => SortClass::BlackShell.label(),
        }
    }

    fn above(self) -> &'static str {
        match self {
            Self::A => "p_A_10",
            Self::B => "p_B_10",
        }
    }

    fn pick(self) -> &'static str {
        match self {
            Self::A => "p_A_0",
            Self::B => "p_B_0",
        }
    }
}

fn single_cycle(slot: PickSlot) -> String {
    let mut script = ScriptBuilder::new();
    script.line(&format!("textmsg(\"pick: {}\")", slot.label()));

    // Pick slot: open wide at depth.
    script.movel(slot.above(), Speed::Approach);
    script.movel(slot.pick(), Speed::Fine);
    script.grip("open_pick_mm", "f_open");
    script.movel(slot.above(), Speed::Fine);

    // C: release.
    script.movel("p_C_10", Speed::Approach);
    script.movel("p_C_0", Speed::Fine);
    script.grip("open_mm", "f_open");
    script.movel("p_C_10", Speed::Fine);

    // D: grip.
    script.movel("p_D_10", Speed::Approach);
    script.movel("p_D_0", Speed::Fine);
    script.grip("close_mm", "f_close");
    script.movel("p_D_10", Speed::Fine);

    // C2: shallow release, hold open.
    script.movel("p_C_10", Speed::Approach);
    script.movel("p_C_2", Speed::Fine);
    script.grip("open_pick_mm", "f_open");

    // E via its approach pose, then home.
    script.movel("p_C_10", Speed::Approach);
    script.movel("p_E_10", Speed::Approach);
    script.movel("p_E_0", Speed::Fine);
    script.grip("open_mm", "f_open");
    script.movel("p_E_10", Speed::Approach);
    script.movel("p_start", Speed::Approach);
    script.finish()
}

#[derive(Debug, Clone, Copy)]
enum Speed {
    Start,
    Approach,
    Fine,
}

impl Speed {
    fn args(self) -> &'static str {
        match self {
            Self::Start => "a=0.3, v=0.15",
            Self::Approach => "a=0.4, v=0.2",
            Self::Fine => "a=0.2, v=0.1",
        }
    }
}

const INDENT: &str = "  ";

struct ScriptBuilder {
    text: String,
}

impl ScriptBuilder {
    fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    fn line(&mut self, line: &str) {
        self.text.push_str(INDENT);
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn blank(&mut self) {
        self.text.push('\n');
    }

    /// Appends pre-indented text verbatim.
    fn raw(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn pose(&mut self, name: &str, pose: &Pose) {
        self.line(&format!("{name} = {}", pose.to_script()));
    }

    fn movel(&mut self, pose_name: &str, speed: Speed) {
        self.line(&format!("movel({pose_name}, {})", speed.args()));
    }

    fn grip(&mut self, width: &str, force: &str) {
        self.line(&format!("rg_grip({width}, {force})"));
    }

    fn finish(self) -> String {
        self.text
    }
}
