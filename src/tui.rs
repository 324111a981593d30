use crate::dashboard::{
    current_price, filter_holdings, group_by_sector, percent_of_total, sector_investments,
    stock_gains, total_investment, FilterState, NetworkStatus, PollInterval, QuoteTable,
};
use crate::holding::Holding;
use crate::quote::QuoteClient;
use chrono::{DateTime, Local};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Tabs},
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tui_big_text::{BigText, PixelSize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Overview,
    Holdings,
}

impl Tab {
    fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview & Charts",
            Tab::Holdings => "Holdings",
        }
    }

    fn all() -> &'static [Tab] {
        &[Tab::Overview, Tab::Holdings]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Normal,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

/// One committed poll cycle, tagged with the generation of the poll task
/// that produced it. The app drops updates from superseded generations so
/// a late result can never overwrite a newer table.
pub struct QuoteUpdate {
    pub generation: u64,
    pub quotes: QuoteTable,
    pub status: NetworkStatus,
}

pub struct App {
    pub current_tab: Tab,
    pub holdings: Vec<Holding>,
    pub quotes: QuoteTable,
    pub filter: FilterState,
    pub mode: AppMode,
    pub should_quit: bool,
    pub currency: String,
    pub previous_values: HashMap<String, f64>,
    pub trends: HashMap<String, Trend>,
    pub last_update: Instant,
    pub last_refresh_at: Option<DateTime<Local>>,
    pub flash_state: bool,
    pub network_status: NetworkStatus,
    pub generation: u64,
    client: QuoteClient,
    update_sender: mpsc::UnboundedSender<QuoteUpdate>,
    update_receiver: mpsc::UnboundedReceiver<QuoteUpdate>,
    poll_handle: Option<JoinHandle<()>>,
}

impl App {
    pub fn new(holdings: Vec<Holding>, client: QuoteClient, currency: String) -> App {
        let (update_sender, update_receiver) = mpsc::unbounded_channel();
        App {
            current_tab: Tab::Overview,
            holdings,
            quotes: QuoteTable::new(),
            filter: FilterState::default(),
            mode: AppMode::Normal,
            should_quit: false,
            currency,
            previous_values: HashMap::new(),
            trends: HashMap::new(),
            last_update: Instant::now(),
            last_refresh_at: None,
            flash_state: false,
            network_status: NetworkStatus::Connected,
            generation: 0,
            client,
            update_sender,
            update_receiver,
            poll_handle: None,
        }
    }

    /// (Re)start the recurring poll task. The previous task is aborted
    /// first, so exactly one timer exists at any time; the fresh
    /// `tokio::time::interval` ticks immediately, which also gives the
    /// immediate poll after an interval change.
    pub fn spawn_poll_task(&mut self) {
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
        self.generation += 1;

        let generation = self.generation;
        let client = self.client.clone();
        let holdings = self.holdings.clone();
        let sender = self.update_sender.clone();
        let period = Duration::from_millis(self.filter.interval.as_millis());

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let (quotes, status) =
                    crate::dashboard::poll_quotes(&client, &holdings).await;
                let update = QuoteUpdate {
                    generation,
                    quotes,
                    status,
                };
                if sender.send(update).is_err() {
                    break;
                }
            }
        });
        self.poll_handle = Some(handle);
    }

    pub fn stop_polling(&mut self) {
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
    }

    pub fn try_receive_update(&mut self) -> bool {
        let mut applied = false;
        while let Ok(update) = self.update_receiver.try_recv() {
            applied |= self.apply_update(update);
        }
        applied
    }

    pub fn apply_update(&mut self, update: QuoteUpdate) -> bool {
        if update.generation != self.generation {
            return false;
        }
        self.update_trends(&update.quotes);
        self.quotes = update.quotes;
        self.network_status = update.status;
        self.mark_refreshed();
        true
    }

    pub fn update_trends(&mut self, new_quotes: &QuoteTable) {
        for holding in &self.holdings {
            let symbol = holding.get_symbol().to_string();
            let value = new_quotes
                .get(&symbol)
                .map(|q| q.cmp * holding.get_qty() as f64)
                .unwrap_or(0.0);

            if let Some(&previous) = self.previous_values.get(&symbol) {
                // 1 cent threshold to avoid noise from tiny changes
                let threshold = 0.01;
                let trend = if value > previous + threshold {
                    Trend::Up
                } else if value < previous - threshold {
                    Trend::Down
                } else {
                    self.trends.get(&symbol).copied().unwrap_or(Trend::Neutral)
                };
                self.trends.insert(symbol.clone(), trend);
            } else {
                self.trends.insert(symbol.clone(), Trend::Neutral);
            }

            self.previous_values.insert(symbol, value);
        }
    }

    pub fn mark_refreshed(&mut self) {
        self.last_update = Instant::now();
        self.last_refresh_at = Some(Local::now());
        self.flash_state = !self.flash_state;
    }

    pub fn get_trend_color(&self, symbol: &str, base_color: Color) -> Color {
        match self.trends.get(symbol) {
            Some(Trend::Up) => {
                if self.flash_state {
                    Color::LightGreen
                } else {
                    Color::Green
                }
            }
            Some(Trend::Down) => {
                if self.flash_state {
                    Color::LightRed
                } else {
                    Color::Red
                }
            }
            _ => base_color,
        }
    }

    pub fn next_tab(&mut self) {
        let tabs = Tab::all();
        let current_index = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current_index + 1) % tabs.len()];
    }

    pub fn previous_tab(&mut self) {
        let tabs = Tab::all();
        let current_index = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current_index + tabs.len() - 1) % tabs.len()];
    }

    pub fn cycle_gain_filter(&mut self) {
        self.filter.gain_filter = self.filter.gain_filter.next();
    }

    /// Switch to the next poll period and restart the timer at it.
    pub fn cycle_interval(&mut self) {
        self.filter.interval = self.filter.interval.next();
        self.spawn_poll_task();
    }

    pub fn enter_search_mode(&mut self) {
        self.mode = AppMode::Search;
    }

    pub fn exit_search_mode(&mut self) {
        self.mode = AppMode::Normal;
    }

    pub fn push_search(&mut self, c: char) {
        self.filter.search.push(c);
    }

    pub fn pop_search(&mut self) {
        self.filter.search.pop();
    }
}

pub async fn run_tui(
    holdings: Vec<Holding>,
    client: QuoteClient,
    currency: String,
) -> eyre::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(holdings, client, currency);
    app.spawn_poll_task();

    let res = run_app(&mut terminal, &mut app).await;

    app.stop_polling();
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()>
where
    std::io::Error: From<<B as Backend>::Error>,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        // Check for committed poll cycles from the background task (non-blocking)
        app.try_receive_update();

        // Use poll to check for events with timeout
        if crossterm::event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.mode {
                        AppMode::Normal => match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => {
                                app.should_quit = true;
                            }
                            KeyCode::Char('/') => {
                                app.enter_search_mode();
                            }
                            KeyCode::Char('g') => {
                                app.cycle_gain_filter();
                            }
                            KeyCode::Char('i') => {
                                app.cycle_interval();
                            }
                            KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => {
                                app.previous_tab();
                            }
                            KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => {
                                app.next_tab();
                            }
                            KeyCode::Char('1') => app.current_tab = Tab::Overview,
                            KeyCode::Char('2') => app.current_tab = Tab::Holdings,
                            _ => {}
                        },
                        AppMode::Search => match key.code {
                            KeyCode::Esc | KeyCode::Enter => {
                                app.exit_search_mode();
                            }
                            KeyCode::Backspace => {
                                app.pop_search();
                            }
                            KeyCode::Char(c) => {
                                app.push_search(c);
                            }
                            _ => {}
                        },
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn format_money(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let parts: Vec<&str> = formatted.split('.').collect();
    let integer_part = parts[0];
    let decimal_part = parts.get(1).unwrap_or(&"00");

    let (sign, digits) = match integer_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", integer_part),
    };

    let grouped = digits
        .chars()
        .rev()
        .collect::<String>()
        .chars()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .rev()
        .collect::<String>();

    format!("{sign}{grouped}.{decimal_part}")
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_tab_bar(f, chunks[0], app);
    render_controls(f, chunks[1], app);

    match app.current_tab {
        Tab::Overview => render_overview(f, chunks[2], app),
        Tab::Holdings => render_holdings(f, chunks[2], app),
    }

    let help_text = match app.mode {
        AppMode::Normal => {
            "Keys: / (search) | g (gainers/losers) | i (poll interval) | h/l (tabs) | q (quit)"
        }
        AppMode::Search => "Search: type to filter | Enter/Esc (done)",
    };
    let help = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(help, chunks[3]);
}

fn render_tab_bar(f: &mut Frame, area: Rect, app: &App) {
    let tab_titles: Vec<Line> = Tab::all()
        .iter()
        .map(|t| {
            let style = if *t == app.current_tab {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(t.title(), style))
        })
        .collect();

    let tabs = Tabs::new(tab_titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Portfolio Dashboard"),
        )
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow))
        .select(
            Tab::all()
                .iter()
                .position(|&t| t == app.current_tab)
                .unwrap_or(0),
        );

    f.render_widget(tabs, area);
}

fn render_controls(f: &mut Frame, area: Rect, app: &App) {
    let search_display = if app.mode == AppMode::Search {
        let cursor = if app.flash_state { "█" } else { "▌" };
        format!("{}{cursor}", app.filter.search)
    } else if app.filter.search.is_empty() {
        "-".to_string()
    } else {
        app.filter.search.clone()
    };

    let refresh_indicator = if app.flash_state { "🔄" } else { "📊" };
    let network_indicator = match app.network_status {
        NetworkStatus::Connected => "🟢",
        NetworkStatus::Partial => "🟡",
        NetworkStatus::Disconnected => "🔴",
    };
    let updated = match app.last_refresh_at {
        Some(at) => at.format("%H:%M:%S").to_string(),
        None => "never".to_string(),
    };

    let mut spans = vec![
        Span::styled("Search: ", Style::default().fg(Color::Gray)),
        Span::styled(search_display, Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled("Every: ", Style::default().fg(Color::Gray)),
    ];
    for interval in PollInterval::all() {
        let style = if *interval == app.filter.interval {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(interval.label(), style));
        spans.push(Span::raw(" "));
    }
    spans.extend(vec![
        Span::raw(" |  "),
        Span::styled("Show: ", Style::default().fg(Color::Gray)),
        Span::styled(
            app.filter.gain_filter.label(),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw("  |  "),
        Span::styled("Updated: ", Style::default().fg(Color::Gray)),
        Span::raw(format!("{updated} {refresh_indicator} {network_indicator}")),
    ]);

    let controls = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Controls"));
    f.render_widget(controls, area);
}

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(area);

    render_total_value(f, main_chunks[0], app);

    let chart_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_chunks[1]);

    let filtered = filter_holdings(&app.holdings, &app.quotes, &app.filter);
    render_sector_chart(f, chart_chunks[0], &filtered);
    render_gain_list(f, chart_chunks[1], app, &filtered);
}

fn render_total_value(f: &mut Frame, area: Rect, app: &App) {
    let total_present: f64 = app
        .holdings
        .iter()
        .map(|h| current_price(h, &app.quotes) * h.get_qty() as f64)
        .sum();

    let big_text_value = format!("{} {}", format_money(total_present), app.currency);
    let big_text = BigText::builder()
        .pixel_size(PixelSize::Quadrant)
        .style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
        .lines(vec![big_text_value.clone().into()])
        .build();

    let frame_block = Block::default()
        .borders(Borders::ALL)
        .title("Present Portfolio Value")
        .title_alignment(Alignment::Center);
    f.render_widget(frame_block, area);

    let inner = area.inner(ratatui::layout::Margin {
        horizontal: 1,
        vertical: 1,
    });
    let big_text_width = big_text_value.len() as u16 * 4;
    let centered_area = if big_text_width < inner.width {
        let margin = (inner.width - big_text_width) / 2;
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(margin),
                Constraint::Min(0),
                Constraint::Length(margin),
            ])
            .split(inner)[1]
    } else {
        inner
    };

    f.render_widget(big_text, centered_area);
}

fn render_sector_chart(f: &mut Frame, area: Rect, filtered: &[&Holding]) {
    let groups = group_by_sector(filtered);
    let investments = sector_investments(&groups);

    let data: Vec<(&str, u64)> = investments
        .iter()
        .map(|(sector, investment)| (sector.as_str(), *investment as u64))
        .collect();

    let barchart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Sector-wise Investment"),
        )
        .data(&data)
        .bar_width(12)
        .bar_style(Style::default().fg(Color::Yellow))
        .value_style(Style::default().fg(Color::Black).bg(Color::Yellow));

    f.render_widget(barchart, area);
}

fn render_gain_list(f: &mut Frame, area: Rect, app: &App, filtered: &[&Holding]) {
    let gains = stock_gains(filtered, &app.quotes);

    let items: Vec<ListItem> = gains
        .iter()
        .map(|(symbol, gain)| {
            let color = if *gain >= 0.0 { Color::Green } else { Color::Red };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{symbol:<10}"), Style::default().fg(Color::White)),
                Span::styled(
                    format!("{:>14}", format_money(*gain)),
                    Style::default().fg(color),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Stock-wise Gain/Loss"),
        )
        .style(Style::default().fg(Color::White));

    f.render_widget(list, area);
}

fn render_holdings(f: &mut Frame, area: Rect, app: &App) {
    let filtered = filter_holdings(&app.holdings, &app.quotes, &app.filter);
    let groups = group_by_sector(&filtered);
    let total = total_investment(&app.holdings);

    let header_cells = [
        "Stock", "Qty", "Buy", "Invested", "CMP", "Present", "Gain/Loss", "P/E", "Earnings", "%",
    ]
    .iter()
    .map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let mut rows: Vec<Row> = Vec::new();
    for (sector, members) in &groups {
        rows.push(
            Row::new(vec![Cell::from(format!("▸ {sector}")).style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )])
            .height(1),
        );

        for holding in members {
            let symbol = holding.get_symbol();
            let quote = app.quotes.get(symbol);
            let invested = holding.investment();
            let cmp = current_price(holding, &app.quotes);
            let present = cmp * holding.get_qty() as f64;
            let gain = present - invested;
            let percent = percent_of_total(holding, total);

            let cmp_color = app.get_trend_color(symbol, Color::White);
            let gain_color = if gain >= 0.0 { Color::Green } else { Color::Red };

            rows.push(Row::new(vec![
                Cell::from(holding.get_name().to_string()),
                Cell::from(holding.get_qty().to_string()),
                Cell::from(format!("{:.2}", holding.get_purchase_price())),
                Cell::from(format!("{invested:.2}")),
                Cell::from(format!("{cmp:.2}")).style(Style::default().fg(cmp_color)),
                Cell::from(format!("{present:.2}")),
                Cell::from(format!("{gain:.2}")).style(Style::default().fg(gain_color)),
                Cell::from(quote.map(|q| q.pe_ratio.clone()).unwrap_or_else(|| "-".to_string())),
                Cell::from(
                    quote
                        .map(|q| q.latest_earnings.clone())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::from(format!("{percent:.2}%")),
            ]));
        }
    }

    let constraints = [
        Constraint::Percentage(16),
        Constraint::Percentage(6),
        Constraint::Percentage(9),
        Constraint::Percentage(11),
        Constraint::Percentage(9),
        Constraint::Percentage(11),
        Constraint::Percentage(11),
        Constraint::Percentage(7),
        Constraint::Percentage(12),
        Constraint::Percentage(8),
    ];

    let table = Table::new(rows, constraints)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Holdings"))
        .style(Style::default().fg(Color::White));

    f.render_widget(table, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::GainFilter;
    use crate::quote::LiveQuote;

    fn test_app() -> App {
        let holdings = vec![
            Holding::sample("AAA", 10, 100.0, "Tech"),
            Holding::sample("BBB", 5, 200.0, "Energy"),
        ];
        App::new(
            holdings,
            QuoteClient::new("http://127.0.0.1:9"),
            "INR".to_string(),
        )
    }

    fn update(generation: u64, cmp: f64) -> QuoteUpdate {
        let mut quotes = QuoteTable::new();
        quotes.insert(
            "AAA".to_string(),
            LiveQuote {
                cmp,
                pe_ratio: "22.1".to_string(),
                latest_earnings: "2026-07-01".to_string(),
            },
        );
        QuoteUpdate {
            generation,
            quotes,
            status: NetworkStatus::Connected,
        }
    }

    #[test]
    fn test_apply_update_rejects_stale_generation() {
        let mut app = test_app();
        app.generation = 2;

        assert!(!app.apply_update(update(1, 110.0)));
        assert!(app.quotes.is_empty());

        assert!(app.apply_update(update(2, 110.0)));
        assert_eq!(app.quotes["AAA"].cmp, 110.0);
    }

    #[tokio::test]
    async fn test_interval_change_restarts_single_poll_task() {
        let mut app = test_app();
        app.spawn_poll_task();
        let old_generation = app.generation;
        assert!(app.poll_handle.is_some());

        app.cycle_interval();
        assert_eq!(app.generation, old_generation + 1);
        assert_eq!(app.filter.interval, PollInterval::Sec30);

        // a late commit from the superseded cycle must not be consumed
        assert!(!app.apply_update(update(old_generation, 999.0)));
        assert!(app.quotes.is_empty());

        app.stop_polling();
        assert!(app.poll_handle.is_none());
    }

    #[test]
    fn test_search_editing() {
        let mut app = test_app();
        app.enter_search_mode();
        assert_eq!(app.mode, AppMode::Search);
        app.push_search('a');
        app.push_search('b');
        app.pop_search();
        assert_eq!(app.filter.search, "a");
        app.exit_search_mode();
        assert_eq!(app.mode, AppMode::Normal);
    }

    #[test]
    fn test_gain_filter_and_tab_cycling() {
        let mut app = test_app();
        app.cycle_gain_filter();
        assert_eq!(app.filter.gain_filter, GainFilter::Gainers);
        app.cycle_gain_filter();
        assert_eq!(app.filter.gain_filter, GainFilter::Losers);
        app.cycle_gain_filter();
        assert_eq!(app.filter.gain_filter, GainFilter::All);

        app.next_tab();
        assert_eq!(app.current_tab, Tab::Holdings);
        app.next_tab();
        assert_eq!(app.current_tab, Tab::Overview);
        app.previous_tab();
        assert_eq!(app.current_tab, Tab::Holdings);
    }

    #[test]
    fn test_update_trends() {
        let mut app = test_app();
        app.update_trends(&update(1, 100.0).quotes);
        assert_eq!(app.trends["AAA"], Trend::Neutral);

        app.update_trends(&update(1, 101.0).quotes);
        assert_eq!(app.trends["AAA"], Trend::Up);

        app.update_trends(&update(1, 90.0).quotes);
        assert_eq!(app.trends["AAA"], Trend::Down);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(1234567.891), "1,234,567.89");
        assert_eq!(format_money(999.5), "999.50");
        assert_eq!(format_money(-1234.5), "-1,234.50");
        assert_eq!(format_money(0.0), "0.00");
    }
}
