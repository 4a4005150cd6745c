use crate::config::Settings;
use crate::engine::{EngineState, Outcome};
use crate::preview;
use crate::render::{make_renderer, Frame};
use crate::session::PitchVis;
use crate::terminal::TerminalGuard;
use anyhow::Context;
use log::info;
use std::io::BufWriter;
use std::time::{Duration, Instant};

const HUD_ROWS: u16 = 1;
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Runs one session to its end, optionally with a live terminal preview.
pub fn run(cfg: Settings) -> anyhow::Result<Outcome> {
    let session = PitchVis::start(&cfg.input, &cfg)
        .with_context(|| format!("start visualization of {}", cfg.input.display()))?;

    if cfg.preview {
        run_preview(&cfg, &session)?;
    } else {
        run_headless(&session);
    }

    let (published, width) = session.progress();
    let outcome = session.join();
    info!("{}: {} ({published}/{width} columns)", cfg.input.display(), outcome.state().label());
    Ok(outcome)
}

fn run_headless(session: &PitchVis) {
    let mut last_log = Instant::now();
    while !session.is_finished() {
        session.wait_for_update(Duration::from_millis(100));
        if last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
            last_log = Instant::now();
            let (published, width) = session.progress();
            if width > 0 {
                info!(
                    "{}: {published}/{width} columns ({:.0}%)",
                    session.state().label(),
                    100.0 * published as f64 / width as f64
                );
            } else {
                info!("{}", session.state().label());
            }
        }
    }
}

fn run_preview(cfg: &Settings, session: &PitchVis) -> anyhow::Result<()> {
    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());
    let mut renderer = make_renderer(cfg.renderer);
    let (sx, sy) = renderer.cell_pixels();
    let frame_interval = Duration::from_secs_f64(1.0 / cfg.preview_fps.max(1) as f64);
    let mut dirty = true;

    loop {
        if TerminalGuard::poll_quit(frame_interval)? {
            session.cancel();
            break;
        }
        dirty |= session.poll_more_available();
        let state = session.state();

        if dirty {
            dirty = false;
            let (cols, rows) = TerminalGuard::size()?;
            let visual_rows = rows.saturating_sub(HUD_ROWS);
            let (pw, ph) = (cols as usize * sx, visual_rows as usize * sy);
            let (published, width) = session.progress();
            let hud = preview::status_line(state.label(), published, width, session.scale());

            let pixels = match session.read_tail(pw) {
                Some(snap) => preview::compose(&snap, session.scale(), pw, ph),
                None => vec![0u8; pw * ph * 4],
            };
            let frame = Frame {
                term_cols: cols,
                term_rows: rows,
                visual_rows,
                pixel_width: pw,
                pixel_height: ph,
                pixels_rgba: &pixels,
                hud: &hud,
                hud_rows: HUD_ROWS,
                sync_updates: true,
            };
            renderer.render(&frame, &mut out)?;
        }

        // Keep the finished picture up until the user quits.
        if state.is_terminal() && state != EngineState::Completed {
            break;
        }
    }
    Ok(())
}
