mod fields;
#[cfg(test)]
mod test;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use romaneio_core::{
    Ledger, LedgerConfig, LineItem, ManifestHeader, ReadMode, WriteMode, record::sheet_key, scan,
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "romaneio")]
#[command(about = "Delivery manifests kept one sheet per day in an XLSX workbook.")]
struct Cli {
    /// Workbook holding the manifests.
    #[arg(long, global = true, default_value = "romaneio.xlsx")]
    file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new, empty manifest sheet for a date.
    New {
        /// `dd/mm/yyyy`, today when omitted.
        #[arg(long)]
        date: Option<String>,
    },
    /// Add one order to the manifest of a date.
    Add(AddArgs),
    /// Show the items of a manifest sheet.
    List {
        /// Defaults to the last sheet of the workbook.
        #[arg(long)]
        sheet: Option<String>,
        /// Do not label columns with the metadata row.
        #[arg(long)]
        raw_rows: bool,
        #[arg(long)]
        json: bool,
    },
    /// Remove the item shown at `--index`.
    Remove {
        #[arg(long)]
        sheet: String,
        #[arg(long)]
        index: usize,
        /// Physical row of index 0.
        #[arg(long)]
        row_offset: Option<u32>,
    },
    /// List sheet names.
    Sheets,
}

#[derive(Debug, Parser)]
struct AddArgs {
    /// Target sheet, e.g. one printed by `new`. Defaults to the date's sheet.
    #[arg(long)]
    sheet: Option<String>,
    #[arg(long)]
    city: String,
    /// `dd/mm/yyyy`, today when omitted.
    #[arg(long)]
    date: Option<String>,
    /// Nine-digit order number.
    #[arg(long)]
    order: String,
    #[arg(long)]
    reseller: String,
    /// Dinheiro, Cartão or Boleto.
    #[arg(long)]
    payment: String,
    /// e.g. `R$ 1.234,50`
    #[arg(long)]
    amount: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("erro: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::New { date } => {
            let date = fields::date(date.as_deref())?;
            let name = Ledger::default().create_sheet(&cli.file, &sheet_key(date), WriteMode::Fresh)?;
            println!("{name}");
        }
        Command::Add(args) => {
            let (header, item) = parse_add(&args)?;
            let sheet = args.sheet.unwrap_or_else(|| header.sheet_key());
            let name = Ledger::default().append_record(
                &cli.file,
                &sheet,
                &header.cells(),
                &item.cells(),
            )?;
            println!("{name}");
        }
        Command::List { sheet, raw_rows, json } => {
            let mode = if raw_rows { ReadMode::RawRows } else { ReadMode::MetadataAsHeader };
            let sheet = match sheet {
                Some(sheet) => sheet,
                None => match scan(&cli.file)?.pop() {
                    Some(last) => last,
                    None => {
                        println!("Nenhum item adicionado ainda.");
                        return Ok(());
                    }
                },
            };
            let view = Ledger::default().read_sheet(&cli.file, &sheet, mode);
            match view {
                Some(view) if json => println!("{}", serde_json::to_string_pretty(&view)?),
                Some(view) => {
                    if let Some(headers) = &view.headers {
                        println!("   {}", headers.join(" | "));
                    }
                    for (i, row) in view.rows.iter().enumerate() {
                        println!("{i:>2} {}", row.join(" | "));
                    }
                }
                None if json => println!("null"),
                None => println!("Nenhum item adicionado ainda."),
            }
        }
        Command::Remove { sheet, index, row_offset } => {
            let config = LedgerConfig { row_offset, ..LedgerConfig::default() };
            Ledger::new(config)
                .delete_row(&cli.file, &sheet, index)
                .with_context(|| format!("removendo item {index} de {sheet}"))?;
        }
        Command::Sheets => {
            for name in scan(&cli.file)? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn parse_add(args: &AddArgs) -> Result<(ManifestHeader, LineItem)> {
    let header = ManifestHeader::new(
        fields::city(&args.city)?,
        fields::date(args.date.as_deref())?,
    );
    let item = LineItem {
        order_number: fields::order_number(&args.order)?,
        reseller: fields::reseller(&args.reseller)?,
        payment: fields::payment(&args.payment)?.to_owned(),
        amount_cents: fields::amount_cents(&args.amount)?,
    };
    Ok((header, item))
}
