//! Scripted runs of the scan loop against simulated switches.
//!
//! A script closes and opens switches, plays host notes and moves the
//! expression pedal at given times. The loop scans every `period_ms` like
//! the firmware does and records the MIDI it would have sent.
//!
//! ```toml
//! period_ms = 4
//! duration_ms = 100
//! transpose = 2
//!
//! [[step]]
//! at_ms = 0
//! device = "great"
//! strobe = 1
//! sense = 3
//! closed = true
//!
//! [[step]]
//! at_ms = 40
//! button = "up"
//! closed = true
//!
//! [[step]]
//! at_ms = 60
//! host_note = 20
//! on = true
//!
//! [[step]]
//! at_ms = 80
//! expression = 512
//! ```

use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use log::{debug, info};
use serde::Deserialize;

use organ_scan::organ::{ChannelSink, NoteSink, SCAN_PERIOD_MS};
use organ_scan::panel::{self, ExpressionPedal, HostMessage, HostState};
use organ_scan::piston::{reset_sequence, Gesture};
use organ_scan::sim::SimulatedLines;
use organ_scan::{LineId, LogicalKey};

use crate::wiring::Wiring;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default = "default_period")]
    pub period_ms: u32,
    pub duration_ms: u32,
    /// Transpose the host reports, undone by the reset chord.
    #[serde(default)]
    pub transpose: i16,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_period() -> u32 {
    SCAN_PERIOD_MS
}

/// One scripted change. A step names exactly one target: a switch (`device`
/// or `button`, with `closed`), a host note (`host_note`, with `on`) or an
/// `expression` pedal reading.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub at_ms: u32,
    pub device: Option<String>,
    pub strobe: Option<usize>,
    pub sense: Option<usize>,
    pub button: Option<Button>,
    pub closed: Option<bool>,
    pub host_note: Option<u8>,
    pub on: Option<bool>,
    /// Raw 10-bit ADC reading.
    pub expression: Option<u16>,
}

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Up,
    Down,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing script {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let script: Script = toml::from_str(contents).context("invalid TOML")?;
        if script.period_ms == 0 {
            bail!("period_ms must be at least 1");
        }
        Ok(script)
    }

    /// Number of scan frames the run takes.
    pub fn frames(&self) -> u64 {
        u64::from(self.duration_ms / self.period_ms) + 1
    }
}

/// A MIDI message the firmware would have sent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Note { key: LogicalKey, pressed: bool },
    Control { control: u8, value: u8 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub at_ms: u32,
    pub channel: u8,
    pub message: Message,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}ms  ch {:>2}  ", self.at_ms, self.channel)?;
        match self.message {
            Message::Note { key, pressed } => {
                write!(f, "key {:>3}  {}", key, if pressed { "on" } else { "off" })
            }
            Message::Control { control, value } => write!(f, "cc  {:>3}  {}", control, value),
        }
    }
}

#[derive(Default)]
struct Recorder {
    at_ms: u32,
    events: Vec<Event>,
}

impl Recorder {
    fn push(&mut self, channel: u8, message: Message) {
        self.events.push(Event {
            at_ms: self.at_ms,
            channel,
            message,
        });
    }
}

impl NoteSink for Recorder {
    fn on_key_event(&mut self, channel: u8, key: LogicalKey, pressed: bool) {
        self.push(channel, Message::Note { key, pressed });
    }

    fn on_control_change(&mut self, channel: u8, control: u8, value: u8) {
        self.push(channel, Message::Control { control, value });
    }
}

/// What a script step does once resolved against the wiring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Action {
    Switch {
        strobe: Option<LineId>,
        sense: LineId,
        closed: bool,
    },
    Host(HostMessage),
    Expression(u16),
}

fn resolve(wiring: &Wiring, step: &Step) -> Result<Action> {
    let targets = [
        step.device.is_some(),
        step.button.is_some(),
        step.host_note.is_some(),
        step.expression.is_some(),
    ];
    match targets.iter().filter(|&&named| named).count() {
        0 => bail!("a step needs a target"),
        1 => {}
        _ => bail!("a step names more than one target"),
    }

    if let Some(note) = step.host_note {
        let Some(on) = step.on else {
            bail!("missing `on`");
        };
        // The host plays its notes on channel 1; the console ignores it.
        let channel = 1;
        return Ok(Action::Host(if on {
            HostMessage::NoteOn { channel, note }
        } else {
            HostMessage::NoteOff { channel, note }
        }));
    }
    if let Some(raw) = step.expression {
        return Ok(Action::Expression(raw));
    }

    let Some(closed) = step.closed else {
        bail!("missing `closed`");
    };
    let (strobe, sense) = match (&step.button, &step.device) {
        (Some(button), _) => {
            let Some(transpose) = wiring.transpose else {
                bail!("wiring has no transpose buttons");
            };
            let line = match button {
                Button::Up => transpose.up,
                Button::Down => transpose.down,
            };
            (None, line)
        }
        (None, Some(name)) => {
            let Some(index) = wiring.find(name) else {
                bail!("unknown device `{}`", name);
            };
            let config = &wiring.devices[index].config;
            let Some(sense_index) = step.sense else {
                bail!("missing `sense`");
            };
            let Some(&sense) = config.senses.get(sense_index) else {
                bail!("device `{}` has no sense {}", name, sense_index);
            };
            let strobe = match (config.strobes.is_empty(), step.strobe) {
                (true, None) => None,
                (true, Some(_)) => {
                    bail!("device `{}` is wired to ground and has no strobes", name)
                }
                (false, None) => bail!("missing `strobe`"),
                (false, Some(i)) => match config.strobes.get(i) {
                    Some(&line) => Some(line),
                    None => bail!("device `{}` has no strobe {}", name, i),
                },
            };
            (strobe, sense)
        }
        (None, None) => bail!("a step needs a target"),
    };
    Ok(Action::Switch {
        strobe,
        sense,
        closed,
    })
}

/// Run `script` against `wiring`, ticking `progress` once per frame.
pub fn run(wiring: &Wiring, script: &Script, progress: Option<&ProgressBar>) -> Result<Vec<Event>> {
    let mut actions = script
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            resolve(wiring, step)
                .map(|action| (step.at_ms, action))
                .with_context(|| format!("step {}", i + 1))
        })
        .collect::<Result<Vec<_>>>()?;
    actions.sort_by_key(|&(at_ms, _)| at_ms);

    let mut io = SimulatedLines::new();
    let mut console = wiring.begin(&mut io)?;
    let mut recorder = Recorder::default();
    let mut pending = actions.into_iter().peekable();

    let mut host = HostState::new();
    host.apply(HostMessage::Transpose(script.transpose));
    console.panel.show(&host, &mut io);
    let mut pedal = ExpressionPedal::new();
    let mut expression_raw = 0u16;
    let mut last_expression = 0u32;

    let mut now = 0u32;
    while now <= script.duration_ms {
        while let Some((_, action)) = pending.next_if(|&(at_ms, _)| at_ms <= now) {
            debug!("{}ms: {:?}", now, action);
            match action {
                Action::Switch {
                    strobe,
                    sense,
                    closed,
                } => io.set_switch(strobe, sense, closed),
                Action::Host(message) => {
                    host.apply(message);
                    console.panel.show(&host, &mut io);
                }
                Action::Expression(raw) => expression_raw = raw,
            }
        }

        recorder.at_ms = now;
        if now.wrapping_sub(last_expression) >= panel::EXPRESSION_PERIOD_MS {
            last_expression = now;
            if let Some(value) = pedal.update(expression_raw) {
                recorder.on_control_change(
                    panel::EXPRESSION_CHANNEL,
                    panel::EXPRESSION_CONTROL,
                    value,
                );
            }
        }

        panel::scan_enabled(
            &mut console.scanner,
            &console.channels,
            &host,
            &mut io,
            &mut ChannelSink::new(&console.channels, &mut recorder),
        );

        if let Some((device, gesture)) = console.gesture.as_mut() {
            let mut sink = ChannelSink::new(&console.channels, &mut recorder);
            if gesture.poll(now, &mut io, &mut sink) == Some(Gesture::Reset) {
                info!("reset chord at {}ms, undoing transpose {}", now, host.transpose());
                if let Some(channel) = console.channels.channel(*device) {
                    for (key, transition) in reset_sequence(host.transpose()) {
                        recorder.on_key_event(channel, key, transition.is_pressed());
                    }
                }
            }
        }

        if let Some(pb) = progress {
            pb.inc(1);
        }
        now = match now.checked_add(script.period_ms) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(recorder.events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_text(text: &str) -> Vec<Event> {
        let script = Script::parse(text).unwrap();
        run(&Wiring::reference(), &script, None).unwrap()
    }

    fn note(at_ms: u32, channel: u8, key: LogicalKey, pressed: bool) -> Event {
        Event {
            at_ms,
            channel,
            message: Message::Note { key, pressed },
        }
    }

    fn control(at_ms: u32, channel: u8, control: u8, value: u8) -> Event {
        Event {
            at_ms,
            channel,
            message: Message::Control { control, value },
        }
    }

    #[test]
    fn test_great_key_press_and_release() {
        // Strobe 1, sense 3 of the Great: key -5 + 1 + 18 = 14.
        let events = run_text(
            r#"
            period_ms = 4
            duration_ms = 100
            [[step]]
            at_ms = 0
            device = "great"
            strobe = 1
            sense = 3
            closed = true
            [[step]]
            at_ms = 50
            device = "great"
            strobe = 1
            sense = 3
            closed = false
            "#,
        );
        // Pressed on the first closed scan; released after three open scans
        // (52, 56, 60).
        assert_eq!(events, vec![note(0, 2, 14, true), note(60, 2, 14, false)]);
    }

    #[test]
    fn test_bottom_key_of_pedal() {
        let events = run_text(
            r#"
            duration_ms = 8
            [[step]]
            at_ms = 0
            device = "pedal"
            strobe = 5
            sense = 0
            closed = true
            "#,
        );
        assert_eq!(events, vec![note(0, 1, 0, true)]);
    }

    #[test]
    fn test_short_bounce_is_filtered() {
        // Closed at 0, open at 2: only the first scan sees it closed. The
        // press goes out at once; the release needs three open scans.
        let events = run_text(
            r#"
            period_ms = 4
            duration_ms = 20
            [[step]]
            at_ms = 0
            device = "swell"
            strobe = 0
            sense = 1
            closed = true
            [[step]]
            at_ms = 2
            device = "swell"
            strobe = 0
            sense = 1
            closed = false
            "#,
        );
        assert_eq!(events, vec![note(0, 3, 1, true), note(12, 3, 1, false)]);
    }

    #[test]
    fn test_transpose_button_is_a_key() {
        let events = run_text(
            r#"
            duration_ms = 8
            [[step]]
            at_ms = 0
            button = "up"
            closed = true
            "#,
        );
        assert_eq!(events, vec![note(0, 5, 20, true)]);
    }

    #[test]
    fn test_reset_chord_replays_transpose() {
        let events = run_text(
            r#"
            duration_ms = 8
            transpose = -2
            [[step]]
            at_ms = 0
            button = "up"
            closed = true
            [[step]]
            at_ms = 0
            button = "down"
            closed = true
            "#,
        );
        assert_eq!(
            events,
            vec![
                note(0, 5, 21, true),
                note(0, 5, 21, false),
                note(0, 5, 21, true),
                note(0, 5, 21, false),
            ]
        );
    }

    #[test]
    fn test_direct_piston() {
        let events = run_text(
            r#"
            duration_ms = 0
            [[step]]
            at_ms = 0
            device = "pistons"
            sense = 4
            closed = true
            "#,
        );
        assert_eq!(events, vec![note(0, 5, 4, true)]);
    }

    #[test]
    fn test_step_errors() {
        let wiring = Wiring::reference();
        for (text, expected) in [
            ("device = \"choir\"\nsense = 0", "unknown device `choir`"),
            ("device = \"pistons\"\nstrobe = 0\nsense = 0", "wired to ground"),
            ("device = \"great\"\nsense = 0", "missing `strobe`"),
            ("device = \"great\"\nstrobe = 9\nsense = 0", "has no strobe 9"),
            ("button = \"up\"\ndevice = \"great\"", "more than one target"),
            ("host_note = 20\nexpression = 3", "more than one target"),
            ("sense = 0", "needs a target"),
        ] {
            let text = format!("duration_ms = 4\n[[step]]\nat_ms = 0\nclosed = true\n{}", text);
            let script = Script::parse(&text).unwrap();
            let err = run(&wiring, &script, None).unwrap_err();
            let message = format!("{:#}", err);
            assert!(message.contains("step 1"), "{}", message);
            assert!(message.contains(expected), "{}", message);
        }
    }

    #[test]
    fn test_missing_state_rejected() {
        let wiring = Wiring::reference();
        for (text, expected) in [
            ("host_note = 20", "missing `on`"),
            ("device = \"great\"\nstrobe = 0\nsense = 1", "missing `closed`"),
        ] {
            let text = format!("duration_ms = 4\n[[step]]\nat_ms = 0\n{}", text);
            let script = Script::parse(&text).unwrap();
            let message = format!("{:#}", run(&wiring, &script, None).unwrap_err());
            assert!(message.contains(expected), "{}", message);
        }
    }

    #[test]
    fn test_host_switches_pedal_off() {
        // The pedal key is held throughout; it only sounds once the host
        // releases note 20.
        let events = run_text(
            r#"
            duration_ms = 40
            [[step]]
            at_ms = 0
            host_note = 20
            on = true
            [[step]]
            at_ms = 0
            device = "pedal"
            strobe = 5
            sense = 0
            closed = true
            [[step]]
            at_ms = 0
            device = "great"
            strobe = 1
            sense = 3
            closed = true
            [[step]]
            at_ms = 20
            host_note = 20
            on = false
            "#,
        );
        assert_eq!(events, vec![note(0, 2, 14, true), note(20, 1, 0, true)]);
    }

    #[test]
    fn test_other_host_notes_leave_pedal_on() {
        let events = run_text(
            r#"
            duration_ms = 0
            [[step]]
            at_ms = 0
            host_note = 21
            on = true
            [[step]]
            at_ms = 0
            device = "pedal"
            strobe = 5
            sense = 0
            closed = true
            "#,
        );
        assert_eq!(events, vec![note(0, 1, 0, true)]);
    }

    #[test]
    fn test_expression_sent_on_change() {
        // Read every 400ms; the second read sees no change.
        let events = run_text(
            r#"
            duration_ms = 800
            [[step]]
            at_ms = 0
            expression = 512
            "#,
        );
        assert_eq!(events, vec![control(400, 5, 11, 81)]);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(Script::parse("period_ms = 0\nduration_ms = 10").is_err());
    }

    #[test]
    fn test_frames() {
        let script = Script::parse("period_ms = 4\nduration_ms = 100").unwrap();
        assert_eq!(script.frames(), 26);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(note(12, 2, 14, true).to_string(), "    12ms  ch  2  key  14  on");
        assert_eq!(control(400, 5, 11, 81).to_string(), "   400ms  ch  5  cc   11  81");
    }
}
