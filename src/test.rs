use crate::{Cli, Command, fields, parse_add, run};
use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use romaneio_core::{Ledger, ReadMode, scan};

#[test]
fn amounts_follow_brazilian_notation() -> Result<()> {
    assert_eq!(fields::amount_cents("R$ 1.234,50")?, 123450);
    assert_eq!(fields::amount_cents("10,5")?, 1050);
    assert_eq!(fields::amount_cents(" 7 ")?, 700);
    // `.` is a thousands separator, never a decimal mark
    assert_eq!(fields::amount_cents("10.50")?, 105000);

    let negative = fields::amount_cents("-3,00").unwrap_err();
    assert_eq!(negative.to_string(), "O valor não pode ser negativo");
    let garbage = fields::amount_cents("dez reais").unwrap_err();
    assert_eq!(garbage.to_string(), "Valor inválido");
    Ok(())
}

#[test]
fn text_fields_are_normalised() -> Result<()> {
    assert_eq!(fields::order_number(" 000123456 ")?, "000123456");
    assert!(fields::order_number("12345678").is_err());
    assert!(fields::order_number("12345678a").is_err());

    assert_eq!(fields::reseller("  maria  ")?, "MARIA");
    assert!(fields::reseller("   ").is_err());

    assert_eq!(fields::payment("cartão")?, "Cartão");
    assert!(fields::payment("pix").is_err());
    assert_eq!(fields::city("monte mor")?, "Monte Mor");
    assert!(fields::city("Campinas").is_err());
    Ok(())
}

#[test]
fn dates_parse_or_default_to_today() -> Result<()> {
    assert_eq!(
        fields::date(Some("05/06/2025"))?,
        NaiveDate::from_ymd_opt(2025, 6, 5).unwrap()
    );
    assert!(fields::date(Some("2025-06-05")).is_err());
    assert_eq!(fields::date(None)?, chrono::Local::now().date_naive());
    Ok(())
}

#[test]
fn add_command_builds_typed_records() -> Result<()> {
    let cli = Cli::try_parse_from([
        "romaneio", "add", "--city", "paulínia", "--date", "01/01/2025", "--order", "123456789",
        "--reseller", "acme", "--payment", "boleto", "--amount", "R$ 10,00",
    ])?;
    let Command::Add(args) = cli.command else {
        panic!("expected add");
    };
    let (header, item) = parse_add(&args)?;
    assert_eq!(header.city, "Paulínia");
    assert_eq!(header.sheet_key(), "01_01_2025");
    assert_eq!(item.reseller, "ACME");
    assert_eq!(item.payment, "Boleto");
    assert_eq!(item.amount_cents, 1000);
    Ok(())
}

#[test]
fn commands_drive_the_workbook() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("romaneio.xlsx");
    let file_arg = file.to_string_lossy().into_owned();
    let cli = |args: &[&str]| {
        let mut argv = vec!["romaneio", "--file", file_arg.as_str()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)
    };

    run(cli(&["new", "--date", "01/01/2025"])?)?;
    for order in ["111111111", "222222222"] {
        run(cli(&[
            "add", "--city", "Monte Mor", "--date", "01/01/2025", "--order", order,
            "--reseller", "acme", "--payment", "dinheiro", "--amount", "5",
        ])?)?;
    }
    run(cli(&["remove", "--sheet", "01_01_2025", "--index", "0"])?)?;

    assert_eq!(scan(&file)?, ["01_01_2025"]);
    let view = Ledger::default()
        .read_sheet(&file, "01_01_2025", ReadMode::RawRows)
        .expect("one row left");
    assert_eq!(view.rows, [vec!["222222222", "ACME", "Dinheiro", "R$ 5.00"]]);

    assert!(run(cli(&["remove", "--sheet", "01_01_2025", "--index", "5"])?).is_err());
    Ok(())
}

#[test]
fn add_can_target_a_fresh_manifest() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("romaneio.xlsx");
    let file_arg = file.to_string_lossy().into_owned();
    let cli = |args: &[&str]| {
        let mut argv = vec!["romaneio", "--file", file_arg.as_str()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)
    };

    run(cli(&["new", "--date", "01/01/2025"])?)?;
    run(cli(&["new", "--date", "01/01/2025"])?)?;
    run(cli(&[
        "add", "--sheet", "01_01_2025_1", "--city", "Paulínia", "--date", "01/01/2025",
        "--order", "123456789", "--reseller", "acme", "--payment", "boleto", "--amount", "12,30",
    ])?)?;

    assert_eq!(scan(&file)?, ["01_01_2025", "01_01_2025_1"]);
    let ledger = Ledger::default();
    assert!(ledger.read_sheet(&file, "01_01_2025", ReadMode::RawRows).is_none());
    let view = ledger
        .read_sheet(&file, "01_01_2025_1", ReadMode::RawRows)
        .expect("item in the fresh sheet");
    assert_eq!(view.rows, [vec!["123456789", "ACME", "Boleto", "R$ 12.30"]]);
    Ok(())
}
