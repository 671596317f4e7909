use std::time::Duration;

use clap::Parser;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use bthome::adv::{AdvConfig, AdvMachine, Phase};
use bthome::backend::EntropySource;
use bthome::sim::{FixedEntropy, FlakyAead, MockRadio};
use bthome::{ButtonEvent, CcmAead, NonceContext};

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = AdvConfig {
        dwell: Duration::from_millis(args.dwell_ms),
        interval_hint: Duration::from_millis(args.interval_ms),
        device_name: Some("BTHomeBtn"),
    };

    let mut events = if args.event.is_empty() {
        demo_timeline()
    } else {
        args.event.clone()
    };
    events.sort_by_key(|e| e.at_ms);

    println!("BTHome button beacon simulation");
    println!(
        "mode: {}  dwell: {} ms  interval hint: {} ms",
        if args.encrypt { "encrypted (AES-128-CCM)" } else { "plaintext" },
        args.dwell_ms,
        args.interval_ms,
    );
    println!("timeline: {} event(s)", events.len());
    println!();

    let mut radio = MockRadio::new();
    radio.fail_stop = args.fail_stop;

    let report = if args.encrypt {
        let ctx = build_context(&args);
        println!("replay counter seeded at 0x{:08x}", ctx.replay_counter());
        let aead = FlakyAead::new(CcmAead, args.fail_seals);
        let machine = AdvMachine::encrypted(radio, config, ctx, aead);
        run_timeline(machine, &events, &args)
    } else {
        let machine = AdvMachine::plaintext(radio, config);
        run_timeline(machine, &events, &args)
    };

    println!();
    println!("metrics json: {}", serde_json::to_string(&report).unwrap());
    if let Some(path) = args.metrics_csv.as_ref() {
        let mut content = String::from(
            "broadcasts,stops,delivered_events,dropped_events,final_packet_id,encrypted\n",
        );
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            report.broadcasts,
            report.stops,
            report.delivered_events,
            report.dropped_events,
            report.final_packet_id,
            args.encrypt,
        ));
        std::fs::write(path, content).expect("write metrics csv");
        println!("metrics written to {}", path);
    }
}

fn build_context(args: &Args) -> NonceContext {
    let address = args.address.unwrap_or([0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);
    let key_hex = args.key.as_deref();
    match args.seed {
        // Deterministic runs for comparing wire bytes across invocations.
        Some(seed) => {
            let mut entropy = FixedEntropy::new(seed.to_le_bytes());
            NonceContext::new(address, key_hex, &mut entropy).expect("fixed entropy")
        }
        None => {
            let mut entropy = OsEntropy;
            // A dead CSPRNG means no encrypted beaconing at all.
            NonceContext::new(address, key_hex, &mut entropy).expect("system entropy")
        }
    }
}

fn run_timeline<A: bthome::Aead>(
    mut machine: AdvMachine<MockRadio, A>,
    events: &[ScriptedEvent],
    args: &Args,
) -> Report {
    let mut delivered = 0usize;
    let mut dropped = 0usize;
    let mut reported_payloads = 0usize;
    let mut next_event = 0usize;
    let mut last_phase = machine.phase();

    let mut now = 0u64;
    for _ in 0..args.ticks {
        while next_event < events.len() && events[next_event].at_ms <= now {
            let ev = &events[next_event];
            if machine.offer_event(ev.slot, ev.event) {
                delivered += 1;
                println!("[{:>5} ms] button {} -> {:?}", now, ev.slot, ev.event);
            } else {
                dropped += 1;
                println!("[{:>5} ms] button {} -> {:?} (dropped)", now, ev.slot, ev.event);
            }
            next_event += 1;
        }

        machine.tick(now);

        let stats = machine.radio().stats();
        if stats.starts > reported_payloads {
            reported_payloads = stats.starts;
            let hex: String = machine
                .radio()
                .last_payload()
                .unwrap_or(&[])
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect();
            println!("[{:>5} ms] advertising {} bytes: {}", now, hex.len() / 2, hex);
        }
        let phase = machine.phase();
        if phase == Phase::Idle && last_phase == Phase::Advertising {
            println!("[{:>5} ms] window closed, state cleared", now);
        }
        last_phase = phase;

        now += args.tick_ms;
    }

    let stats = machine.radio().stats();
    Report {
        broadcasts: stats.starts,
        stops: stats.stops,
        delivered_events: delivered,
        dropped_events: dropped,
        final_packet_id: machine.packet_id(),
        final_replay_counter: machine.replay_counter(),
        duration_ms: now,
    }
}

fn demo_timeline() -> Vec<ScriptedEvent> {
    vec![
        ScriptedEvent { at_ms: 50, slot: 0, event: ButtonEvent::Press },
        ScriptedEvent { at_ms: 120, slot: 2, event: ButtonEvent::DoublePress },
        // Lands inside the first window; coalesces into the next one.
        ScriptedEvent { at_ms: 400, slot: 0, event: ButtonEvent::LongPress },
        ScriptedEvent { at_ms: 1500, slot: 3, event: ButtonEvent::TriplePress },
    ]
}

struct OsEntropy;

impl EntropySource for OsEntropy {
    type Error = rand::Error;

    fn fill_bytes(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        OsRng.try_fill_bytes(buf)
    }
}

#[derive(Parser, Debug)]
struct Args {
    /// Seal payloads with AES-128-CCM.
    #[arg(long, default_value_t = false)]
    encrypt: bool,

    /// 16-byte pre-shared key as hex (32 chars). Malformed keys fall back to
    /// the default key with a warning, as on the device.
    #[arg(long)]
    key: Option<String>,

    /// Advertising address as aa:bb:cc:dd:ee:ff.
    #[arg(long, value_parser = parse_address)]
    address: Option<[u8; 6]>,

    /// Scripted event as MS:SLOT:KIND, e.g. 250:0:press. Repeatable.
    /// Kinds: press, double, triple, long, long-double, long-triple.
    #[arg(long = "event", value_parser = parse_event)]
    event: Vec<ScriptedEvent>,

    /// Fixed replay-counter seed instead of system entropy.
    #[arg(long)]
    seed: Option<u32>,

    /// Advertise window length.
    #[arg(long, default_value_t = 500)]
    dwell_ms: u64,

    /// Advertising interval hint.
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Scheduler tick period.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Number of scheduler ticks to run.
    #[arg(long, default_value_t = 60)]
    ticks: u64,

    /// Make the mock radio fail every stop call.
    #[arg(long, default_value_t = false)]
    fail_stop: bool,

    /// Fail the first N seal attempts to show the retry path.
    #[arg(long, default_value_t = 0)]
    fail_seals: usize,

    /// Path to write run metrics as CSV.
    #[arg(long)]
    metrics_csv: Option<String>,
}

#[derive(Clone, Debug)]
struct ScriptedEvent {
    at_ms: u64,
    slot: u8,
    event: ButtonEvent,
}

#[derive(Serialize)]
struct Report {
    broadcasts: usize,
    stops: usize,
    delivered_events: usize,
    dropped_events: usize,
    final_packet_id: u8,
    final_replay_counter: Option<u32>,
    duration_ms: u64,
}

fn parse_event(s: &str) -> Result<ScriptedEvent, String> {
    let mut parts = s.splitn(3, ':');
    let at_ms = parts
        .next()
        .ok_or("missing time")?
        .parse::<u64>()
        .map_err(|e| e.to_string())?;
    let slot = parts
        .next()
        .ok_or("missing slot")?
        .parse::<u8>()
        .map_err(|e| e.to_string())?;
    if slot as usize >= bthome::BUTTON_COUNT {
        return Err(format!("slot must be 0..{}", bthome::BUTTON_COUNT));
    }
    let event = match parts.next().ok_or("missing event kind")? {
        "press" => ButtonEvent::Press,
        "double" => ButtonEvent::DoublePress,
        "triple" => ButtonEvent::TriplePress,
        "long" => ButtonEvent::LongPress,
        "long-double" => ButtonEvent::LongDoublePress,
        "long-triple" => ButtonEvent::LongTriplePress,
        other => return Err(format!("unknown event kind: {}", other)),
    };
    Ok(ScriptedEvent { at_ms, slot, event })
}

fn parse_address(s: &str) -> Result<[u8; 6], String> {
    let mut out = [0u8; 6];
    let mut count = 0;
    for (i, part) in s.split(':').enumerate() {
        if i >= 6 {
            return Err("address has more than 6 octets".into());
        }
        out[i] = u8::from_str_radix(part, 16).map_err(|e| e.to_string())?;
        count += 1;
    }
    if count != 6 {
        return Err(format!("expected 6 octets, got {}", count));
    }
    Ok(out)
}
