//! Command handler for the query shell

use std::fmt::{self, Write as _};
use std::path::Path;
use std::sync::Arc;

use snrfilter::{
    parse_filter, parse_query, FilterCriteria, FilterStats, Record, Records, SearchMode,
    SnrEngine,
};
use tracing::{debug, warn};

/// Rows printed for a result set; EXPORT writes all of them
const PREVIEW_ROWS: usize = 20;

/// Filter suggestions aim for about this many high-SNR records
const SUGGEST_TARGET: usize = 10;

const HELP: &str = "\
FILTER <field=min..max ...>  apply a range filter (field=v means v..v)
CLEAR                        remove the active filter
STATS                        statistics of the active filter or full data set
TOP <n> [field=min..max ...] best n records by SNR
EXACT <field=value ...>      exact search
FUZZY <field=value ...>      fuzzy search (tol=<t> sets the SNR tolerance)
SCORE <field=value ...>      fuzzy search with a closeness score per match
OPTIMIZE <n> <field=min..max ...> move the snr floor toward n matches
SUGGEST [field=partial]      complete a value, or propose filters
HISTORY [CLEAR]              show or clear search history
EXPORT <path.csv|path.json>  write the last result set
CACHE                        cache and query counters
FLUSH                        purge the result cache
HELP                         this text
QUIT                         exit
fields: pre main post (decimal or 0x hex), snr (float)";

/// Outcome of one command line
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Normal output
    Text(String),
    /// Printed as `ERR <message>`
    Error(String),
    /// Leave the loop
    Quit,
}

impl Reply {
    fn ok() -> Self {
        Reply::Text("OK".to_string())
    }

    fn error(message: impl fmt::Display) -> Self {
        Reply::Error(message.to_string())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Text(text) => f.write_str(text),
            Reply::Error(message) => write!(f, "ERR {}", message),
            Reply::Quit => f.write_str("BYE"),
        }
    }
}

pub struct CommandHandler {
    engine: SnrEngine,
    last: Option<Records>,
}

impl CommandHandler {
    pub fn new(engine: SnrEngine) -> Self {
        Self { engine, last: None }
    }

    pub fn engine(&self) -> &SnrEngine {
        &self.engine
    }

    pub async fn handle(&mut self, line: &str) -> Reply {
        let line = line.trim();
        if line.is_empty() {
            return Reply::Text(String::new());
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command.to_uppercase(), rest.trim()),
            None => (line.to_uppercase(), ""),
        };
        debug!("Command {} {}", command, rest);

        match command.as_str() {
            "FILTER" => self.handle_filter(rest).await,
            "CLEAR" => self.handle_clear(),
            "STATS" => self.handle_stats(),
            "TOP" => self.handle_top(rest).await,
            "EXACT" => self.handle_search(rest, SearchMode::Exact).await,
            "FUZZY" => self.handle_search(rest, SearchMode::Fuzzy).await,
            "SCORE" => self.handle_score(rest).await,
            "OPTIMIZE" => self.handle_optimize(rest).await,
            "SUGGEST" => self.handle_suggest(rest),
            "HISTORY" => self.handle_history(rest),
            "EXPORT" => self.handle_export(rest),
            "CACHE" => self.handle_cache(),
            "FLUSH" => self.handle_flush(),
            "HELP" => Reply::Text(HELP.to_string()),
            "QUIT" | "EXIT" => Reply::Quit,
            _ => Reply::Error(format!("unknown command '{}'", command)),
        }
    }

    async fn handle_filter(&mut self, args: &str) -> Reply {
        if args.is_empty() {
            return Reply::error("wrong number of arguments for 'filter' command");
        }
        let Some(criteria) = parse_filter(args) else {
            return Reply::Error(format!("could not parse filter '{}'", args));
        };
        match self.engine.apply_filter(criteria).await {
            Ok((records, stats)) => {
                let mut out = format!("{}\n", criteria);
                write_stats(&mut out, &stats);
                write_rows(&mut out, &records);
                self.last = Some(records);
                Reply::Text(out)
            }
            Err(e) => Reply::error(e),
        }
    }

    fn handle_clear(&mut self) -> Reply {
        self.engine.clear_filter();
        Reply::ok()
    }

    fn handle_stats(&self) -> Reply {
        let mut out = match self.engine.active_filter() {
            Some(criteria) => format!("{}\n", criteria),
            None => "no filter\n".to_string(),
        };
        write_stats(&mut out, &self.engine.get_filter_statistics());
        Reply::Text(out)
    }

    async fn handle_top(&mut self, args: &str) -> Reply {
        let (count, tokens) = match args.split_once(char::is_whitespace) {
            Some((count, tokens)) => (count, tokens.trim()),
            None => (args, ""),
        };
        let Ok(n) = count.parse::<usize>() else {
            return Reply::Error(format!("invalid count '{}'", count));
        };
        let criteria = if tokens.is_empty() {
            FilterCriteria::new()
        } else {
            match parse_filter(tokens) {
                Some(criteria) => criteria,
                None => return Reply::Error(format!("could not parse filter '{}'", tokens)),
            }
        };
        match self.engine.top_by_snr(criteria, n).await {
            Ok(top) => {
                let records: Records = Arc::new(top);
                let mut out = String::new();
                write_rows(&mut out, &records);
                self.last = Some(records);
                Reply::Text(out)
            }
            Err(e) => Reply::error(e),
        }
    }

    async fn handle_search(&mut self, args: &str, mode: SearchMode) -> Reply {
        let base = self.engine.new_search_params();
        let Some(params) = parse_query(args, base) else {
            return Reply::Error(format!("could not parse query '{}'", args));
        };
        let result = match mode {
            SearchMode::Exact => self.engine.search_exact(params).await,
            SearchMode::Fuzzy => self.engine.search_fuzzy(params).await,
        };
        match result {
            Ok(records) => {
                let mut out = format!("{} ({} matches)\n", params.mode(mode), records.len());
                write_rows(&mut out, &records);
                self.last = Some(records);
                Reply::Text(out)
            }
            Err(e) => Reply::error(e),
        }
    }

    async fn handle_score(&mut self, args: &str) -> Reply {
        let base = self.engine.new_search_params();
        let Some(params) = parse_query(args, base) else {
            return Reply::Error(format!("could not parse query '{}'", args));
        };
        match self.engine.search_fuzzy_scored(params).await {
            Ok(scored) => {
                let mut out = format!(
                    "{} ({} matches)\n",
                    params.mode(SearchMode::Fuzzy),
                    scored.len()
                );
                for m in scored.iter().take(PREVIEW_ROWS) {
                    let fields: Vec<&str> = m.matched_fields.iter().map(|f| f.name()).collect();
                    let _ = writeln!(out, "{:.3} {} [{}]", m.score, m.record, fields.join(","));
                }
                if scored.len() > PREVIEW_ROWS {
                    let _ = writeln!(out, "... {} more", scored.len() - PREVIEW_ROWS);
                }
                out.pop();
                self.last = Some(Arc::new(scored.iter().map(|m| m.record).collect()));
                Reply::Text(out)
            }
            Err(e) => Reply::error(e),
        }
    }

    async fn handle_optimize(&mut self, args: &str) -> Reply {
        let Some((count, tokens)) = args.split_once(char::is_whitespace) else {
            return Reply::error("wrong number of arguments for 'optimize' command");
        };
        let Ok(target) = count.parse::<usize>() else {
            return Reply::Error(format!("invalid count '{}'", count));
        };
        let Some(criteria) = parse_filter(tokens.trim()) else {
            return Reply::Error(format!("could not parse filter '{}'", tokens.trim()));
        };
        match self.engine.optimize_filter(criteria, target).await {
            Ok(optimized) => Reply::Text(format!("FILTER {}", filter_tokens(&optimized))),
            Err(e) => Reply::error(e),
        }
    }

    fn handle_suggest(&self, args: &str) -> Reply {
        if args.is_empty() {
            let lines: Vec<String> = self
                .engine
                .suggest_filters(SUGGEST_TARGET)
                .iter()
                .map(|criteria| format!("FILTER {}", filter_tokens(criteria)))
                .collect();
            return Reply::Text(lines.join("\n"));
        }
        Reply::Text(self.engine.get_search_suggestions(args).join("\n"))
    }

    fn handle_history(&self, args: &str) -> Reply {
        if args.eq_ignore_ascii_case("clear") {
            self.engine.clear_history();
            return Reply::ok();
        }
        if !args.is_empty() {
            return Reply::Error(format!("unknown HISTORY option '{}'", args));
        }
        let lines: Vec<String> = self
            .engine
            .get_search_history()
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}. [{}] {}", i + 1, entry.mode, entry.params))
            .collect();
        Reply::Text(lines.join("\n"))
    }

    fn handle_export(&self, args: &str) -> Reply {
        if args.is_empty() {
            return Reply::error("wrong number of arguments for 'export' command");
        }
        let Some(records) = &self.last else {
            return Reply::error("no result to export");
        };
        match self.engine.export(records, Path::new(args)) {
            Ok(()) => Reply::Text(format!("exported {} records to {}", records.len(), args)),
            Err(e) => {
                warn!("Export to {} failed: {}", args, e);
                Reply::error(e)
            }
        }
    }

    fn handle_cache(&self) -> Reply {
        let stats = self.engine.cache_stats();
        let filter = self.engine.filter_metrics();
        let search = self.engine.search_metrics();
        let config = &self.engine.config().cache;
        let out = format!(
            "# Cache\n\
             enabled:{}\n\
             cache_size:{}\n\
             cache_capacity:{}\n\
             cache_hits:{}\n\
             cache_misses:{}\n\
             cache_evictions:{}\n\
             cache_unavailable:{}\n\
             cache_hit_ratio:{:.2}\n\
             \n\
             # Queries\n\
             filter_queries:{}\n\
             filter_scans:{}\n\
             filter_avg_scan_us:{:.1}\n\
             search_queries:{}\n\
             search_scans:{}\n\
             search_avg_scan_us:{:.1}",
            config.enabled,
            self.engine.cache_len(),
            config.capacity,
            stats.hits(),
            stats.misses(),
            stats.evictions(),
            stats.unavailable(),
            stats.hit_ratio(),
            filter.queries(),
            filter.scans(),
            filter.average_scan_micros(),
            search.queries(),
            search.scans(),
            search.average_scan_micros(),
        );
        Reply::Text(out)
    }

    fn handle_flush(&self) -> Reply {
        self.engine.clear_cache();
        Reply::ok()
    }
}

fn write_stats(out: &mut String, stats: &FilterStats) {
    let _ = writeln!(
        out,
        "matched {} of {} records ({:.2}%)",
        stats.filtered_count, stats.total_count, stats.percentage
    );
    let span = |range: Option<(i32, i32)>, unique: usize| match range {
        Some((lo, hi)) => format!("[{}, {}] ({} distinct)", lo, hi, unique),
        None => "-".to_string(),
    };
    let _ = writeln!(out, "pre:  {}", span(stats.pre_range, stats.unique_pre));
    let _ = writeln!(out, "main: {}", span(stats.main_range, stats.unique_main));
    let _ = writeln!(out, "post: {}", span(stats.post_range, stats.unique_post));
    if let Some(snr) = &stats.snr {
        let _ = writeln!(
            out,
            "snr:  mean {:.3} min {:.3} max {:.3} std {:.3}",
            snr.mean, snr.min, snr.max, snr.std_dev
        );
    }
    if let Some(best) = &stats.best {
        let _ = writeln!(out, "best:  {}", best);
    }
    if let Some(worst) = &stats.worst {
        let _ = writeln!(out, "worst: {}", worst);
    }
}

fn write_rows(out: &mut String, records: &[Record]) {
    for record in records.iter().take(PREVIEW_ROWS) {
        let _ = writeln!(out, "{}", record);
    }
    if records.len() > PREVIEW_ROWS {
        let _ = writeln!(out, "... {} more", records.len() - PREVIEW_ROWS);
    }
    if out.ends_with('\n') {
        out.pop();
    }
}

/// Render criteria back into FILTER tokens
fn filter_tokens(criteria: &FilterCriteria) -> String {
    let mut tokens = Vec::new();
    let mut push_int = |name: &str, range: Option<snrfilter::Range<i32>>| {
        if let Some(r) = range {
            tokens.push(format!("{}={}..{}", name, r.min, r.max));
        }
    };
    push_int("pre", criteria.pre_range);
    push_int("main", criteria.main_range);
    push_int("post", criteria.post_range);
    if let Some(r) = criteria.snr_range {
        tokens.push(format!("snr={:?}..{:?}", r.min, r.max));
    }
    tokens.join(" ")
}
