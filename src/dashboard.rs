use crate::error::QuoteError;
use crate::holding::Holding;
use crate::quote::{LiveQuote, QuoteClient};
use piechart::{Chart, Color};
use std::collections::HashMap;

/// Latest committed quotes, keyed by symbol. Replaced wholesale on every
/// poll cycle, never merged field-by-field.
pub type QuoteTable = HashMap<String, LiveQuote>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainFilter {
    #[default]
    All,
    Gainers,
    Losers,
}

impl GainFilter {
    pub fn next(self) -> GainFilter {
        match self {
            GainFilter::All => GainFilter::Gainers,
            GainFilter::Gainers => GainFilter::Losers,
            GainFilter::Losers => GainFilter::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GainFilter::All => "All",
            GainFilter::Gainers => "Gainers",
            GainFilter::Losers => "Losers",
        }
    }
}

/// The four permitted poll periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollInterval {
    Sec10,
    #[default]
    Sec15,
    Sec30,
    Sec60,
}

impl PollInterval {
    pub fn all() -> &'static [PollInterval] {
        &[
            PollInterval::Sec10,
            PollInterval::Sec15,
            PollInterval::Sec30,
            PollInterval::Sec60,
        ]
    }

    pub fn as_millis(self) -> u64 {
        match self {
            PollInterval::Sec10 => 10_000,
            PollInterval::Sec15 => 15_000,
            PollInterval::Sec30 => 30_000,
            PollInterval::Sec60 => 60_000,
        }
    }

    pub fn next(self) -> PollInterval {
        match self {
            PollInterval::Sec10 => PollInterval::Sec15,
            PollInterval::Sec15 => PollInterval::Sec30,
            PollInterval::Sec30 => PollInterval::Sec60,
            PollInterval::Sec60 => PollInterval::Sec10,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PollInterval::Sec10 => "10s",
            PollInterval::Sec15 => "15s",
            PollInterval::Sec30 => "30s",
            PollInterval::Sec60 => "1m",
        }
    }
}

/// User-adjustable presentation controls. Never touches the underlying
/// holdings or quotes.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    pub search: String,
    pub interval: PollInterval,
    pub gain_filter: GainFilter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NetworkStatus {
    Connected,
    Partial,
    Disconnected,
}

/// Last committed price for a holding; 0.0 until its first successful quote.
pub fn current_price(holding: &Holding, quotes: &QuoteTable) -> f64 {
    quotes
        .get(holding.get_symbol())
        .map(|q| q.cmp)
        .unwrap_or(0.0)
}

pub fn unrealized_gain(holding: &Holding, quotes: &QuoteTable) -> f64 {
    current_price(holding, quotes) * holding.get_qty() as f64 - holding.investment()
}

fn matches_search(holding: &Holding, search: &str) -> bool {
    if search.is_empty() {
        return true;
    }
    let needle = search.to_lowercase();
    holding.get_name().to_lowercase().contains(&needle)
        || holding.get_symbol().to_lowercase().contains(&needle)
}

pub fn filter_holdings<'a>(
    holdings: &'a [Holding],
    quotes: &QuoteTable,
    filter: &FilterState,
) -> Vec<&'a Holding> {
    holdings
        .iter()
        .filter(|h| matches_search(h, &filter.search))
        .filter(|h| match filter.gain_filter {
            GainFilter::All => true,
            GainFilter::Gainers => unrealized_gain(h, quotes) >= 0.0,
            GainFilter::Losers => unrealized_gain(h, quotes) < 0.0,
        })
        .collect()
}

/// Partition by sector, preserving first-encounter order of the filtered
/// list. Every holding lands in exactly one group.
pub fn group_by_sector<'a>(filtered: &[&'a Holding]) -> Vec<(String, Vec<&'a Holding>)> {
    let mut groups: Vec<(String, Vec<&Holding>)> = Vec::new();

    for &holding in filtered {
        match groups.iter_mut().find(|(s, _)| s == holding.get_sector()) {
            Some((_, members)) => members.push(holding),
            None => groups.push((holding.get_sector().to_string(), vec![holding])),
        }
    }
    groups
}

/// Total invested capital over the FULL holdings set. Percentage columns
/// always divide by this, so they stay meaningful while rows are filtered.
pub fn total_investment(holdings: &[Holding]) -> f64 {
    holdings.iter().map(|h| h.investment()).sum()
}

pub fn percent_of_total(holding: &Holding, total: f64) -> f64 {
    if total > 0.0 {
        holding.investment() / total * 100.0
    } else {
        0.0
    }
}

pub fn sector_investments(groups: &[(String, Vec<&Holding>)]) -> Vec<(String, f64)> {
    groups
        .iter()
        .map(|(sector, members)| {
            let sum = members.iter().map(|h| h.investment()).sum();
            (sector.clone(), sum)
        })
        .collect()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-stock gain/loss of the filtered set, rounded to two decimals.
pub fn stock_gains(filtered: &[&Holding], quotes: &QuoteTable) -> Vec<(String, f64)> {
    filtered
        .iter()
        .map(|h| (h.get_symbol().to_string(), round2(unrealized_gain(h, quotes))))
        .collect()
}

/// Commit step of one poll cycle: turn the settled per-symbol outcomes into
/// the next quote table. A failed symbol degrades to the sentinel without
/// affecting the others.
pub fn build_quote_table(
    results: Vec<(String, Result<LiveQuote, QuoteError>)>,
) -> (QuoteTable, NetworkStatus) {
    let total = results.len();
    let mut failures = 0;
    let mut table = QuoteTable::new();

    for (symbol, result) in results {
        match result {
            Ok(quote) => {
                table.insert(symbol, quote);
            }
            Err(_) => {
                failures += 1;
                table.insert(symbol, LiveQuote::sentinel());
            }
        }
    }

    let status = if failures == 0 {
        NetworkStatus::Connected
    } else if failures == total {
        NetworkStatus::Disconnected
    } else {
        NetworkStatus::Partial
    };
    (table, status)
}

/// One full poll cycle: fetch every held symbol concurrently, wait for all
/// of them to settle, then commit the new table in one go.
pub async fn poll_quotes(client: &QuoteClient, holdings: &[Holding]) -> (QuoteTable, NetworkStatus) {
    use futures::future::join_all;

    let tasks: Vec<_> = holdings
        .iter()
        .map(|h| client.fetch(h.get_symbol()))
        .collect();
    let outcomes = join_all(tasks).await;

    let results = holdings
        .iter()
        .map(|h| h.get_symbol().to_string())
        .zip(outcomes)
        .collect();
    build_quote_table(results)
}

// Print the holdings grouped by sector, one table per group
pub fn print_tables(holdings: &[Holding], quotes: &QuoteTable) {
    use colored::Colorize;
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement,
        Table,
    };

    let filtered: Vec<&Holding> = holdings.iter().collect();
    let groups = group_by_sector(&filtered);
    let total = total_investment(holdings);

    let mut total_present = 0.0_f64;

    for (sector, members) in &groups {
        println!("{}", sector.bold());

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(120);

        table.set_header(vec![
            Cell::new("Stock").add_attribute(Attribute::Bold),
            Cell::new("Qty").add_attribute(Attribute::Bold),
            Cell::new("Buy").add_attribute(Attribute::Bold),
            Cell::new("Invested").add_attribute(Attribute::Bold),
            Cell::new("CMP").add_attribute(Attribute::Bold),
            Cell::new("Present").add_attribute(Attribute::Bold),
            Cell::new("Gain/Loss").add_attribute(Attribute::Bold),
            Cell::new("P/E").add_attribute(Attribute::Bold),
            Cell::new("Earnings").add_attribute(Attribute::Bold),
            Cell::new("%").add_attribute(Attribute::Bold),
        ]);

        for holding in members {
            let quote = quotes.get(holding.get_symbol());
            let invested = holding.investment();
            let cmp = current_price(holding, quotes);
            let present = cmp * holding.get_qty() as f64;
            let gain = present - invested;
            let percent = percent_of_total(holding, total);
            total_present += present;

            let gain_color = if gain >= 0.0 {
                TColor::Green
            } else {
                TColor::Red
            };

            table.add_row(vec![
                Cell::new(format!(
                    "{} ({})",
                    holding.get_name(),
                    holding.get_exchange()
                )),
                Cell::new(holding.get_qty()).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", holding.get_purchase_price()))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{invested:.2}")).set_alignment(CellAlignment::Right),
                Cell::new(format!("{cmp:.2}")).set_alignment(CellAlignment::Right),
                Cell::new(format!("{present:.2}")).set_alignment(CellAlignment::Right),
                Cell::new(format!("{gain:.2}"))
                    .set_alignment(CellAlignment::Right)
                    .fg(gain_color),
                Cell::new(quote.map(|q| q.pe_ratio.as_str()).unwrap_or("-"))
                    .set_alignment(CellAlignment::Center),
                Cell::new(quote.map(|q| q.latest_earnings.as_str()).unwrap_or("-"))
                    .set_alignment(CellAlignment::Center),
                Cell::new(format!("{percent:.2}%")).set_alignment(CellAlignment::Right),
            ]);
        }

        println!("{table}");
    }

    let total_gain = total_present - total;
    let gain_str = format!("{total_gain:+.2}");
    let gain_colored = if total_gain >= 0.0 {
        gain_str.green()
    } else {
        gain_str.red()
    };
    println!(
        "{} {total:.2} | {} {total_present:.2} | {} {gain_colored}",
        "Invested:".bold(),
        "Present:".bold(),
        "Gain/Loss:".bold(),
    );
}

pub fn draw_pie_chart(groups: &[(String, Vec<&Holding>)]) {
    let colors = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Cyan,
        Color::White,
        Color::Purple,
        Color::Black,
    ];

    let data: Vec<piechart::Data> = sector_investments(groups)
        .into_iter()
        .enumerate()
        .map(|(i, (sector, investment))| piechart::Data {
            label: sector,
            value: investment as f32,
            color: Some(colors[i % colors.len()].into()),
            fill: '•',
        })
        .collect();

    Chart::new()
        .legend(true)
        .radius(9)
        .aspect_ratio(3)
        .draw(&data);
}

// Print the sector allocation in descending order %-wise
pub fn print_allocation(holdings: &[Holding]) {
    let filtered: Vec<&Holding> = holdings.iter().collect();
    let groups = group_by_sector(&filtered);
    let total = total_investment(holdings);

    let mut allocation = sector_investments(&groups);
    allocation.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    println!("====================================");
    for (sector, investment) in allocation {
        let percentage = if total > 0.0 {
            investment / total * 100.0
        } else {
            0.0
        };
        println!("{sector: >16} | {investment: >12.2} | {percentage: >6.2}%");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(cmp: f64) -> LiveQuote {
        LiveQuote {
            cmp,
            pe_ratio: "20.0".to_string(),
            latest_earnings: "2026-06-30".to_string(),
        }
    }

    fn sample_holdings() -> Vec<Holding> {
        vec![
            Holding::sample("AAA", 10, 100.0, "Tech"),
            Holding::sample("BBB", 5, 200.0, "Tech"),
            Holding::sample("CCC", 2, 50.0, "Energy"),
        ]
    }

    #[test]
    fn test_gain_scenario() {
        let holdings = vec![
            Holding::sample("AAA", 10, 100.0, "Tech"),
            Holding::sample("BBB", 5, 200.0, "Tech"),
        ];
        let mut quotes = QuoteTable::new();
        quotes.insert("AAA".to_string(), quote(110.0));
        quotes.insert("BBB".to_string(), quote(180.0));

        assert_eq!(holdings[0].investment(), 1000.0);
        assert_eq!(holdings[1].investment(), 1000.0);
        assert_eq!(unrealized_gain(&holdings[0], &quotes), 100.0);
        assert_eq!(unrealized_gain(&holdings[1], &quotes), -100.0);

        let total = total_investment(&holdings);
        assert_eq!(total, 2000.0);
        assert_eq!(percent_of_total(&holdings[0], total), 50.0);
        assert_eq!(percent_of_total(&holdings[1], total), 50.0);

        let all: Vec<&Holding> = holdings.iter().collect();
        let groups = group_by_sector(&all);
        let sectors = sector_investments(&groups);
        assert_eq!(sectors, vec![("Tech".to_string(), 2000.0)]);

        let filter = FilterState {
            gain_filter: GainFilter::Gainers,
            ..FilterState::default()
        };
        let gainers = filter_holdings(&holdings, &quotes, &filter);
        assert_eq!(gainers.len(), 1);
        assert_eq!(gainers[0].get_symbol(), "AAA");
    }

    #[test]
    fn test_search_matches_name_or_symbol_case_insensitive() {
        let holdings = sample_holdings();
        let quotes = QuoteTable::new();
        let filter = FilterState {
            search: "aaa".to_string(),
            ..FilterState::default()
        };
        let filtered = filter_holdings(&holdings, &quotes, &filter);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].get_symbol(), "AAA");

        let empty = FilterState::default();
        assert_eq!(filter_holdings(&holdings, &quotes, &empty).len(), 3);
    }

    #[test]
    fn test_filter_is_idempotent_and_subset() {
        let holdings = sample_holdings();
        let mut quotes = QuoteTable::new();
        quotes.insert("AAA".to_string(), quote(110.0));

        let filter = FilterState {
            search: "a".to_string(),
            gain_filter: GainFilter::Gainers,
            ..FilterState::default()
        };
        let once = filter_holdings(&holdings, &quotes, &filter);
        let once_symbols: Vec<&str> = once.iter().map(|h| h.get_symbol()).collect();

        for h in &once {
            assert!(holdings.iter().any(|o| o.get_symbol() == h.get_symbol()));
        }

        let owned: Vec<Holding> = once.iter().map(|h| (*h).clone()).collect();
        let twice = filter_holdings(&owned, &quotes, &filter);
        let twice_symbols: Vec<&str> = twice.iter().map(|h| h.get_symbol()).collect();
        assert_eq!(once_symbols, twice_symbols);
    }

    #[test]
    fn test_gainers_and_losers_partition_the_filtered_set() {
        let holdings = sample_holdings();
        let mut quotes = QuoteTable::new();
        quotes.insert("AAA".to_string(), quote(110.0));
        quotes.insert("BBB".to_string(), quote(180.0));
        // CCC has no quote yet: cmp counts as 0, so it classifies as a loser

        let base = FilterState::default();
        let all = filter_holdings(&holdings, &quotes, &base);

        let gainers = filter_holdings(
            &holdings,
            &quotes,
            &FilterState {
                gain_filter: GainFilter::Gainers,
                ..FilterState::default()
            },
        );
        let losers = filter_holdings(
            &holdings,
            &quotes,
            &FilterState {
                gain_filter: GainFilter::Losers,
                ..FilterState::default()
            },
        );

        assert_eq!(gainers.len() + losers.len(), all.len());
        for h in &gainers {
            assert!(!losers.iter().any(|l| l.get_symbol() == h.get_symbol()));
        }
        assert!(losers.iter().any(|h| h.get_symbol() == "CCC"));
    }

    #[test]
    fn test_grouping_covers_each_holding_exactly_once() {
        let holdings = vec![
            Holding::sample("AAA", 1, 10.0, "Tech"),
            Holding::sample("BBB", 1, 10.0, "Energy"),
            Holding::sample("CCC", 1, 10.0, "Tech"),
            Holding::sample("DDD", 1, 10.0, "Health"),
        ];
        let all: Vec<&Holding> = holdings.iter().collect();
        let groups = group_by_sector(&all);

        // first-encounter order, not alphabetical
        let order: Vec<&str> = groups.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(order, vec!["Tech", "Energy", "Health"]);

        let mut seen = 0;
        for (sector, members) in &groups {
            for h in members {
                assert_eq!(h.get_sector(), sector);
                seen += 1;
            }
        }
        assert_eq!(seen, holdings.len());
    }

    #[test]
    fn test_percent_uses_unfiltered_total() {
        let holdings = sample_holdings();
        let total = total_investment(&holdings);
        assert_eq!(total, 1000.0 + 1000.0 + 100.0);

        let sum: f64 = holdings
            .iter()
            .map(|h| percent_of_total(h, total))
            .sum();
        assert!((sum - 100.0).abs() < 1e-9);

        // filtering must not change any row's percentage
        let filter = FilterState {
            search: "AAA".to_string(),
            ..FilterState::default()
        };
        let quotes = QuoteTable::new();
        let filtered = filter_holdings(&holdings, &quotes, &filter);
        assert_eq!(
            percent_of_total(filtered[0], total),
            percent_of_total(&holdings[0], total)
        );
    }

    #[test]
    fn test_commit_isolates_a_failed_symbol() {
        let results = vec![
            ("AAA".to_string(), Ok(quote(110.0))),
            (
                "BBB".to_string(),
                Err(QuoteError::Status(500, "BBB".to_string())),
            ),
            ("CCC".to_string(), Ok(quote(55.0))),
        ];
        let (table, status) = build_quote_table(results);

        assert_eq!(table.len(), 3);
        assert_eq!(table["AAA"].cmp, 110.0);
        assert_eq!(table["CCC"].cmp, 55.0);
        assert_eq!(table["BBB"], LiveQuote::sentinel());
        assert_eq!(status, NetworkStatus::Partial);
    }

    #[test]
    fn test_commit_status_extremes() {
        let all_ok = vec![("AAA".to_string(), Ok(quote(1.0)))];
        assert_eq!(build_quote_table(all_ok).1, NetworkStatus::Connected);

        let all_err = vec![(
            "AAA".to_string(),
            Err(QuoteError::Status(502, "AAA".to_string())),
        )];
        let (table, status) = build_quote_table(all_err);
        assert_eq!(status, NetworkStatus::Disconnected);
        assert_eq!(table["AAA"], LiveQuote::sentinel());
    }

    #[test]
    fn test_stock_gains_round_to_two_decimals() {
        let holdings = vec![Holding::sample("AAA", 3, 33.335, "Tech")];
        let mut quotes = QuoteTable::new();
        quotes.insert("AAA".to_string(), quote(33.3383));

        let all: Vec<&Holding> = holdings.iter().collect();
        let gains = stock_gains(&all, &quotes);
        assert_eq!(gains.len(), 1);
        // 3 x 33.3383 - 3 x 33.335 = 0.0099 -> 0.01
        assert_eq!(gains[0].1, 0.01);
    }

    #[test]
    fn test_poll_interval_cycle() {
        let mut interval = PollInterval::Sec10;
        let mut seen = vec![interval];
        for _ in 0..3 {
            interval = interval.next();
            seen.push(interval);
        }
        assert_eq!(seen, PollInterval::all().to_vec());
        assert_eq!(interval.next(), PollInterval::Sec10);
        assert_eq!(PollInterval::default().as_millis(), 15_000);
    }
}
