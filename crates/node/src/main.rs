mod button;
mod clock;
mod config;
mod countdown;
mod drivers;
mod mode;
mod node;
mod pump;
mod router;
mod scheduler;
mod sensor;
mod telemetry;

#[cfg(feature = "hw")]
mod board;
#[cfg(feature = "sim")]
mod sim;
#[cfg(test)]
mod testkit;

#[cfg(not(any(feature = "sim", feature = "hw")))]
compile_error!("enable the `sim` or the `hw` feature");

use std::{env, time::Duration};

use anyhow::{bail, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::button::Button;
use crate::clock::Tick;
use crate::config::Config;
use crate::drivers::Hardware;
use crate::node::{Ctx, SystemState};
use crate::scheduler::{CoopScheduler, Scheduler};
use crate::telemetry::{node_topic, strip_node_prefix, topics, MqttPublisher, Payload};

const BUTTON_POLL: Duration = Duration::from_millis(20);

/// Upper bound on one wait when nothing is armed.
const IDLE_WAIT: Duration = Duration::from_secs(60);

#[cfg(feature = "hw")]
fn build_hardware(cfg: &Config) -> Result<Box<dyn Hardware>> {
    Ok(Box::new(board::Board::new(&cfg.board)?))
}

#[cfg(all(feature = "sim", not(feature = "hw")))]
fn build_hardware(cfg: &Config) -> Result<Box<dyn Hardware>> {
    let scenario = sim::Scenario::from_str_lossy(&cfg.sim.scenario);
    Ok(Box::new(sim::PlantSim::new(scenario, cfg.sim.diurnal_period_s)))
}

/// Milliseconds since `start` on the scheduler's clock.
fn ticks_since(start: Instant) -> Tick {
    Tick::from_millis(start.elapsed().as_millis() as u64)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load(env::var("CONFIG_PATH").ok().as_deref())?;
    let node_id = cfg.node.id.clone();
    info!(%node_id, broker = %cfg.mqtt.host, port = cfg.mqtt.port, "smartpot node starting");

    let mut hw = build_hardware(&cfg)?;

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new(
        format!("smartpot-{node_id}"),
        cfg.mqtt.host.clone(),
        cfg.mqtt.port,
    );
    mqttoptions.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_s));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 64);
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<(String, Vec<u8>)>(32);

    let sub_client = client.clone();
    let sub_node = node_id.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("mqtt connected");
                    for topic in topics::SUBSCRIPTIONS {
                        let full = node_topic(&sub_node, topic);
                        if let Err(e) = sub_client.try_subscribe(&full, QoS::AtLeastOnce) {
                            warn!(topic = %full, "subscribe failed: {e}");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    if inbound_tx.send((p.topic.clone(), p.payload.to_vec())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("mqtt error: {e}. retrying...");
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    // ── Control loop ────────────────────────────────────────────────
    let start = Instant::now();
    let mut sched = CoopScheduler::new(Tick::ZERO);
    let mut out = MqttPublisher::new(client, &node_id);
    let mut state = {
        let mut ctx = Ctx {
            sched: &mut sched,
            hw: hw.as_mut(),
            out: &mut out,
        };
        SystemState::boot(cfg.timing, &mut ctx)
    };

    let mut button = Button::new(cfg.timing.button_hold_ms);
    let has_button = hw.button_pressed().is_some();
    let mut button_poll = interval(BUTTON_POLL);
    button_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        sched.advance_to(ticks_since(start));
        node::run_due(&mut state, &mut sched, hw.as_mut(), &mut out);

        let wait = match sched.next_deadline() {
            Some(deadline) => Duration::from_millis(deadline.since(sched.now()).max(0) as u64),
            None => IDLE_WAIT,
        };

        tokio::select! {
            msg = inbound_rx.recv() => {
                let Some((topic, bytes)) = msg else {
                    bail!("mqtt event loop stopped");
                };
                sched.advance_to(ticks_since(start));
                match strip_node_prefix(&topic, &node_id) {
                    Some(local) => {
                        let payload = Payload::decode(&bytes);
                        let mut ctx = Ctx {
                            sched: &mut sched,
                            hw: hw.as_mut(),
                            out: &mut out,
                        };
                        state.handle_message(local, &payload, &mut ctx);
                    }
                    None => debug!(%topic, "not addressed to this node"),
                }
            }
            _ = sleep(wait) => {}
            _ = button_poll.tick(), if has_button => {
                let now = ticks_since(start);
                sched.advance_to(now);
                let event = hw
                    .button_pressed()
                    .and_then(|pressed| button.update(pressed, now));
                if let Some(event) = event {
                    debug!(?event, "button");
                    let mut ctx = Ctx {
                        sched: &mut sched,
                        hw: hw.as_mut(),
                        out: &mut out,
                    };
                    state.handle(event.into(), &mut ctx);
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
