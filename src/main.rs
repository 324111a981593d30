use std::fs::read_to_string;

use crate::holding::Holding;
use crate::quote::QuoteClient;

use clap::{arg, Command};
use serde::Deserialize;
use serde::Serialize;

mod dashboard;
mod error;
mod holding;
mod quote;
mod tui;

#[derive(Serialize, Deserialize)]
struct Config {
    backend_url: String,
    holdings_file: String,
    currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3002".to_string(),
            holdings_file: "/home/Joe/holdings.json".to_string(),
            currency: "INR".to_string(),
        }
    }
}

fn cli() -> Command {
    Command::new("stockdash_rs")
        .about("A portfolio dashboard with live stock quotes")
        .arg_required_else_help(true)
        .allow_external_subcommands(true)
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(
            Command::new("table")
                .about("Print your holdings grouped by sector, with live quotes")
                .arg(
                    arg!(<FILE> "JSON file with your holdings")
                        .required(false)
                        .default_value(""),
                ),
        )
        .subcommand(
            Command::new("allocation")
                .about("Show the sector-wise investment allocation of your holdings")
                .arg(
                    arg!(<FILE> "JSON file with your holdings")
                        .required(false)
                        .default_value(""),
                ),
        )
        .subcommand(
            Command::new("dashboard")
                .about("Open the interactive dashboard with periodic quote refresh")
                .arg(
                    arg!(<FILE> "JSON file with your holdings")
                        .required(false)
                        .default_value(""),
                ),
        )
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg: Config = confy::load("stockdash", "config")?;

    let matches = cli().get_matches();

    if matches.subcommand_matches("config").is_some() {
        println!(
            "Your config file is located here: \n{}",
            confy::get_configuration_file_path("stockdash", "config")?.display()
        );
    }

    for subcommand in ["table", "allocation", "dashboard"].iter() {
        if let Some(matches) = matches.subcommand_matches(subcommand) {
            let mut filename = String::new();

            // try to get filename as argument
            if let Ok(Some(f)) = matches.try_get_one::<String>("FILE") {
                filename = f.to_string();
            }
            // if no argument is given, try to get filename from config
            if filename.is_empty() {
                filename.clone_from(&cfg.holdings_file);
            }
            // if no argument and no config is given, print help
            if filename.is_empty() {
                cli().print_help()?;
                return Ok(());
            }

            let holdings_str = match read_to_string(&filename) {
                Ok(s) => s,
                Err(_) => {
                    eprintln!("Error reading file: {filename}");
                    return Ok(());
                }
            };
            let holdings = holding::from_string(&holdings_str);

            if cfg.backend_url.is_empty() {
                return Err(eyre::eyre!(
                    "backend_url is not set; run `stockdash_rs config` to locate the config file"
                ));
            }
            let client = QuoteClient::new(&cfg.backend_url);

            match subcommand as &str {
                "table" => {
                    let (quotes, _) = dashboard::poll_quotes(&client, &holdings).await;
                    dashboard::print_tables(&holdings, &quotes);
                }
                "allocation" => {
                    let all: Vec<&Holding> = holdings.iter().collect();
                    let groups = dashboard::group_by_sector(&all);
                    dashboard::draw_pie_chart(&groups);
                    dashboard::print_allocation(&holdings);
                }
                "dashboard" => {
                    tui::run_tui(holdings, client, cfg.currency.clone()).await?;
                }
                _ => (),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli() {
        let matches = cli().get_matches_from(vec!["stockdash_rs", "table", "example_data.json"]);
        assert_eq!(matches.subcommand_name(), Some("table"));
    }

    #[tokio::test]
    async fn test_poll_against_unreachable_backend() {
        let holdings_str = std::fs::read_to_string("example_data.json").unwrap();
        let holdings = holding::from_string(&holdings_str);
        let client = QuoteClient::new("http://127.0.0.1:9");

        let (quotes, status) = dashboard::poll_quotes(&client, &holdings).await;

        // every symbol degrades to the sentinel; the cycle still commits
        assert_eq!(quotes.len(), holdings.len());
        for h in &holdings {
            assert_eq!(quotes[h.get_symbol()], crate::quote::LiveQuote::sentinel());
        }
        assert_eq!(status, dashboard::NetworkStatus::Disconnected);
    }
}
