//! Form-field validation in front of the ledger. Messages are user-facing.

use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use regex::Regex;
use romaneio_core::record::DATE_FORMAT;
use std::sync::LazyLock;

pub const CITIES: [&str; 3] = ["Paulínia", "Monte Mor", "Santo Antônio de Posse"];
pub const PAYMENTS: [&str; 3] = ["Dinheiro", "Cartão", "Boleto"];

static CURRENCY_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[R$\s.]").expect("currency pattern compiles"));

/// Exactly nine ASCII digits, kept as text.
pub fn order_number(input: &str) -> Result<String> {
    let input = input.trim();
    if input.len() != 9 || !input.bytes().all(|b| b.is_ascii_digit()) {
        bail!("O número do pedido deve ter 9 dígitos");
    }
    Ok(input.to_owned())
}

pub fn reseller(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        bail!("Informe a revendedora");
    }
    Ok(input.to_uppercase())
}

pub fn payment(input: &str) -> Result<&'static str> {
    let input = input.trim().to_lowercase();
    match PAYMENTS.into_iter().find(|p| p.to_lowercase() == input) {
        Some(p) => Ok(p),
        None => bail!("Forma de pagamento inválida: use {}", PAYMENTS.join(", ")),
    }
}

pub fn city(input: &str) -> Result<&'static str> {
    let input = input.trim().to_lowercase();
    match CITIES.into_iter().find(|c| c.to_lowercase() == input) {
        Some(c) => Ok(c),
        None => bail!("Cidade inválida: use {}", CITIES.join(", ")),
    }
}

/// Parses a Brazilian currency amount into cents.
///
/// `R`, `$`, whitespace and `.` are dropped, then `,` is the decimal mark:
/// `"R$ 1.234,50"` is 123450.
pub fn amount_cents(input: &str) -> Result<u64> {
    let cleaned = CURRENCY_NOISE.replace_all(input, "").replace(',', ".");
    let Ok(value) = cleaned.parse::<f64>() else {
        bail!("Valor inválido");
    };
    if !value.is_finite() {
        bail!("Valor inválido");
    }
    if value < 0.0 {
        bail!("O valor não pode ser negativo");
    }
    Ok((value * 100.0).round() as u64)
}

/// `dd/mm/yyyy`, today when absent.
pub fn date(input: Option<&str>) -> Result<NaiveDate> {
    match input.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Local::now().date_naive()),
        Some(s) => match NaiveDate::parse_from_str(s, DATE_FORMAT) {
            Ok(d) => Ok(d),
            Err(_) => bail!("Data inválida, use dd/mm/aaaa"),
        },
    }
}
