use super::ui;
use crate::core::conversion::{ConversionResult, Direction, convert_all};
use crate::core::locale::display_from_decimal;
use crate::core::rates::{Currency, RateSnapshot};
use crate::service::{RateResponse, RateService};
use anyhow::Result;
use comfy_table::Cell;
use rust_decimal::Decimal;

/// Placeholder shown instead of the value date when rates are unavailable.
pub const DATE_PLACEHOLDER: &str = "--/--/----";

impl RateSnapshot {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Moneda"), ui::header_cell("Tasa (Bs)")]);

        for currency in [Currency::Usd, Currency::Eur] {
            let quote = self.quote(currency);
            table.add_row(vec![
                Cell::new(currency.label()),
                ui::amount_cell(quote.map(|q| q.display_text())),
            ]);
        }

        let mut output = format!(
            "{}\n\n",
            ui::style_text("Tipos de cambio BCV", ui::StyleType::Title)
        );
        output.push_str(&table.to_string());
        output.push_str(&format!("\n\n{}", self.value_date_text()));
        if self.date_adjusted {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("Consultado el {}", self.observed_date.format("%d/%m/%Y")),
                    ui::StyleType::Subtle
                )
            ));
        }
        output
    }
}

impl ConversionResult {
    pub fn display_as_table(&self, amount_text: &str, highlight: Option<Direction>) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Conversión"),
            ui::header_cell(&format!("{amount_text} →")),
        ]);

        for converted in self.iter() {
            let label = converted.direction.to_string();
            let label = if highlight == Some(converted.direction) {
                ui::style_text(&label, ui::StyleType::Value)
            } else {
                label
            };
            table.add_row(vec![
                Cell::new(label),
                ui::amount_cell(Some(&converted.formatted)),
            ]);
        }
        table.to_string()
    }
}

/// Formats a failure the way the widget shows it: warning plus date placeholder.
pub fn display_error(message: &str) -> String {
    format!(
        "{}\n\n{}",
        ui::style_text(&format!("⚠️ {message}"), ui::StyleType::Error),
        ui::style_text(DATE_PLACEHOLDER, ui::StyleType::Subtle)
    )
}

pub async fn run(service: &RateService, json: bool) -> Result<()> {
    let pb = ui::new_spinner("Consultando el BCV...");
    let result = service.fetch_snapshot().await;
    pb.finish_and_clear();

    if json {
        let response = match &result {
            Ok(snapshot) => RateResponse::from(snapshot),
            Err(e) => RateResponse::from(e),
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return result.map(|_| ()).map_err(anyhow::Error::from);
    }

    match result {
        Ok(snapshot) => {
            println!("{}", snapshot.display_as_table());
            Ok(())
        }
        Err(e) => {
            println!("{}", display_error(&e.to_string()));
            Err(e.into())
        }
    }
}

pub async fn convert(service: &RateService, amount: Decimal, from: Option<Direction>) -> Result<()> {
    let pb = ui::new_spinner("Consultando el BCV...");
    let snapshot = service.fetch_snapshot().await;
    pb.finish_and_clear();

    let snapshot = snapshot.inspect_err(|e| println!("{}", display_error(&e.to_string())))?;

    let result = convert_all(amount, &snapshot);
    let amount_text = display_from_decimal(amount);
    println!("{}", snapshot.display_as_table());
    println!();
    println!("{}", result.display_as_table(&amount_text, from));

    if result == ConversionResult::zero() && amount > Decimal::ZERO {
        println!(
            "\n{}",
            ui::style_text(
                "Tasas no disponibles: las conversiones se muestran en cero.",
                ui::StyleType::Warning
            )
        );
    }
    Ok(())
}
