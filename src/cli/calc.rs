use super::ui;
use crate::core::calculator::{Calculator, Key};
use crate::scheduler::{RatePoller, RefreshOutcome};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "Teclas: 0-9 , + - * / = c (limpiar) < (borrar) @usd @eur @bs @bs-eur (convertir) r (actualizar) q (salir)";

impl Calculator {
    pub fn display_as_text(&self) -> String {
        let mut output = format!(
            "Pantalla: {}\n",
            ui::style_text(self.display_value(), ui::StyleType::Value)
        );
        for converted in self.conversions().iter() {
            output.push_str(&format!(
                "  {:<10} {}\n",
                converted.direction.to_string(),
                converted.formatted
            ));
        }
        output
    }
}

/// Applies one input line to the calculator.
///
/// Tokens are separated by whitespace; a number is typed digit by digit.
/// In a number holding both `.` and `,` the dots are thousands separators.
/// Returns the tokens that were not understood.
pub fn apply_line(calculator: &mut Calculator, line: &str) -> Vec<String> {
    let mut rejected = Vec::new();
    for token in line.split_whitespace() {
        if token.len() > 1 && token.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
            let grouped = token.contains('.') && token.contains(',');
            for c in token.chars().filter(|&c| !(grouped && c == '.')) {
                calculator.press(Key::Digit(c));
            }
            continue;
        }
        match token.parse::<Key>() {
            Ok(key) => calculator.press(key),
            Err(e) => {
                debug!(error = %e, "Ignoring token");
                rejected.push(token.to_string());
            }
        }
    }
    rejected
}

/// Feedback for a manual refresh. A successful refresh is reported through
/// the cache watcher instead.
pub fn refresh_message(outcome: &RefreshOutcome) -> Option<String> {
    match outcome {
        RefreshOutcome::Updated(_) => None,
        RefreshOutcome::Failed(e) => Some(super::rates::display_error(&e.to_string())),
        RefreshOutcome::Skipped => Some(ui::style_text(
            "Ya hay una actualización en curso",
            ui::StyleType::Subtle,
        )),
        RefreshOutcome::NotDue => Some(ui::style_text(
            "Las tasas ya están actualizadas",
            ui::StyleType::Subtle,
        )),
    }
}

pub async fn run(poller: Arc<RatePoller>) -> Result<()> {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let scheduler = tokio::spawn(Arc::clone(&poller).run(async {
        let _ = stop_rx.await;
    }));

    let mut reader = poller.cache().reader();
    let mut calculator = Calculator::new(reader.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", ui::style_text(HELP, ui::StyleType::Subtle));
    println!("{}", calculator.display_as_text());

    loop {
        tokio::select! {
            changed = reader.changed() => {
                if !changed {
                    break;
                }
                calculator.refresh_conversions();
                if let Some(snapshot) = reader.latest() {
                    println!("{}", snapshot.display_as_table());
                }
                println!("{}", calculator.display_as_text());
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match line.trim() {
                    "q" | "salir" => break,
                    "r" => {
                        if let Some(message) = refresh_message(&poller.refresh().await) {
                            println!("{message}");
                        }
                        continue;
                    }
                    _ => {}
                }
                let rejected = apply_line(&mut calculator, &line);
                if !rejected.is_empty() {
                    println!(
                        "{}",
                        ui::style_text(
                            &format!("Teclas no reconocidas: {}", rejected.join(" ")),
                            ui::StyleType::Warning
                        )
                    );
                }
                println!("{}", calculator.display_as_text());
            }
        }
    }

    let _ = stop_tx.send(());
    scheduler.await.context("Scheduler task failed")?;
    Ok(())
}
