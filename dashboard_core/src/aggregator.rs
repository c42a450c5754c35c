//! The live results board: KPIs, party results and region participation,
//! refreshed on a timer outside the wizard.

use log::{debug, info, warn};
use serde_json::Value as JSValue;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, SystemTime};

use crate::model::*;
use crate::normalize;
use crate::ticker::{TickFlow, Ticker};

/// Label of the whole-country entry of the region selector.
pub const NATIONAL: &str = "Nacional";

pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(15);

/// The read endpoints behind the board. Answers are returned undecoded.
pub trait LiveFeed: Send + Sync {
    fn fetch_kpis(&self) -> DashboardResult<JSValue>;
    fn fetch_party_results(&self) -> DashboardResult<JSValue>;
    fn fetch_region_participation(&self) -> DashboardResult<JSValue>;
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum RegionSelection {
    National,
    Region(String),
}

impl Default for RegionSelection {
    fn default() -> RegionSelection {
        RegionSelection::National
    }
}

impl RegionSelection {
    pub fn from_name(name: &str) -> RegionSelection {
        if name == NATIONAL {
            RegionSelection::National
        } else {
            RegionSelection::Region(name.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RegionSelection::National => NATIONAL,
            RegionSelection::Region(name) => name.as_str(),
        }
    }
}

/// One fetched piece of the board.
#[derive(PartialEq, Debug, Clone)]
pub enum BoardUpdate {
    Kpis(Kpis),
    Parties(Vec<PartyResult>),
    Regions(RegionTable),
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct ResultsBoard {
    kpis: Kpis,
    parties: Vec<PartyResult>,
    regions: RegionTable,
    selection: RegionSelection,
    last_update: Option<SystemTime>,
}

impl ResultsBoard {
    pub fn apply(&mut self, update: BoardUpdate) {
        match update {
            BoardUpdate::Kpis(k) => self.kpis = k,
            BoardUpdate::Parties(p) => self.parties = p,
            BoardUpdate::Regions(r) => self.regions = r,
        }
    }

    pub fn kpis(&self) -> &Kpis {
        &self.kpis
    }

    pub fn parties(&self) -> &[PartyResult] {
        &self.parties
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn selection(&self) -> &RegionSelection {
        &self.selection
    }

    pub fn last_update(&self) -> Option<SystemTime> {
        self.last_update
    }

    pub fn mark_updated(&mut self, at: SystemTime) {
        self.last_update = Some(at);
    }

    /// `"Nacional"` followed by every known region, in backend order.
    /// Blank names and a region called `"Nacional"` are left out.
    pub fn region_options(&self) -> Vec<String> {
        let regions = self
            .regions
            .names()
            .filter(|name| !name.trim().is_empty() && *name != NATIONAL);
        std::iter::once(NATIONAL)
            .chain(regions)
            .map(|s| s.to_string())
            .collect()
    }

    pub fn select_region(&mut self, name: &str) {
        self.selection = RegionSelection::from_name(name);
    }

    fn selected_region(&self) -> Option<Option<&RegionParticipation>> {
        match &self.selection {
            RegionSelection::National => None,
            RegionSelection::Region(name) => Some(self.regions.get(name)),
        }
    }

    /// Parties for the current selection, most votes first.
    ///
    /// The backend has no per-region party breakdown, so a known region shows
    /// the national results. An unknown region shows nothing.
    pub fn visible_parties(&self) -> Vec<PartyResult> {
        if let Some(None) = self.selected_region() {
            return Vec::new();
        }
        let mut res = self.parties.clone();
        res.sort_by(|a, b| b.votes.cmp(&a.votes));
        res
    }

    pub fn total_votes(&self) -> u64 {
        match self.selected_region() {
            None => self.parties.iter().map(|p| p.votes).fold(0u64, u64::saturating_add),
            Some(Some(region)) => region.votes,
            Some(None) => 0,
        }
    }

    /// Scale for the party bars, never 0.
    pub fn max_votes(&self) -> u64 {
        self.visible_parties()
            .iter()
            .map(|p| p.votes)
            .max()
            .unwrap_or(0)
            .max(1)
    }

    pub fn participation_percent(&self) -> f64 {
        match self.selected_region() {
            None => self.kpis.participation,
            Some(Some(region)) => region.percentage,
            Some(None) => 0.0,
        }
    }

    pub fn party_share(&self, party: &PartyResult) -> f64 {
        let total = self.total_votes();
        if total == 0 {
            0.0
        } else {
            party.votes as f64 / total as f64 * 100.0
        }
    }

    /// The party shown as leading a region, with its color. Regions the
    /// backend reports without a party take the first national party.
    pub fn leading_party<'a>(&'a self, region: &'a RegionParticipation) -> Option<(&'a str, &'a str)> {
        match &region.party {
            Some(party) => Some((party.as_str(), region.color.as_str())),
            None => self
                .parties
                .first()
                .map(|p| (p.party_name.as_str(), p.color.as_str())),
        }
    }
}

fn lock_board(board: &Mutex<ResultsBoard>) -> MutexGuard<'_, ResultsBoard> {
    // A panicking reader leaves the board consistent: every update is a single assignment.
    board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fetch_into<T>(
    what: &str,
    fetch: impl FnOnce() -> DashboardResult<JSValue>,
    convert: fn(&JSValue) -> T,
    wrap: fn(T) -> BoardUpdate,
    tx: Sender<BoardUpdate>,
) {
    let payload = match fetch() {
        Ok(payload) => {
            debug!("refresh: {} payload {}", what, payload);
            payload
        }
        Err(e) => {
            warn!("refresh: could not load {}: {}", what, e);
            JSValue::Null
        }
    };
    // The receiver only goes away once every sender is done.
    let _ = tx.send(wrap(convert(&payload)));
}

/// Fetches the three feeds side by side and applies each one to the board as
/// soon as it arrives. Failures leave their part at its default.
pub fn refresh<F: LiveFeed + ?Sized>(board: &Mutex<ResultsBoard>, feed: &F) {
    info!("refresh: loading results");
    let (tx, rx) = mpsc::channel::<BoardUpdate>();
    thread::scope(|s| {
        let kpis_tx = tx.clone();
        s.spawn(move || {
            fetch_into("kpis", || feed.fetch_kpis(), normalize::kpis, BoardUpdate::Kpis, kpis_tx)
        });
        let parties_tx = tx.clone();
        s.spawn(move || {
            fetch_into(
                "party results",
                || feed.fetch_party_results(),
                normalize::party_results,
                BoardUpdate::Parties,
                parties_tx,
            )
        });
        s.spawn(move || {
            fetch_into(
                "region participation",
                || feed.fetch_region_participation(),
                normalize::region_participation,
                BoardUpdate::Regions,
                tx,
            )
        });
        for update in rx.iter() {
            lock_board(board).apply(update);
        }
    });
    lock_board(board).mark_updated(SystemTime::now());
}

/// Refreshes a shared board on a fixed period, starting right away.
/// Dropping the poller stops it.
pub struct Poller {
    ticker: Ticker,
}

impl Poller {
    /// `on_refresh` sees the board after every completed refresh.
    pub fn start<C>(
        board: Arc<Mutex<ResultsBoard>>,
        feed: Arc<dyn LiveFeed>,
        period: Duration,
        on_refresh: C,
    ) -> Poller
    where
        C: Fn(&ResultsBoard) + Send + 'static,
    {
        info!("poller: refreshing every {:?}", period);
        let ticker = Ticker::spawn("results-poller", period, true, move || {
            refresh(&board, feed.as_ref());
            on_refresh(&lock_board(&board));
            TickFlow::Continue
        });
        Poller { ticker }
    }

    pub fn is_running(&self) -> bool {
        !self.ticker.is_finished()
    }

    pub fn stop(self) {
        self.ticker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    fn party(name: &str, votes: u64) -> PartyResult {
        PartyResult {
            party_name: name.to_string(),
            votes,
            percentage: 0.0,
            color: "#2563EB".to_string(),
        }
    }

    fn region(name: &str, party: Option<&str>, votes: u64, percentage: f64) -> RegionParticipation {
        RegionParticipation {
            region: name.to_string(),
            party: party.map(|s| s.to_string()),
            percentage,
            votes,
            color: "#16A34A".to_string(),
        }
    }

    fn board() -> ResultsBoard {
        let mut b = ResultsBoard::default();
        b.apply(BoardUpdate::Kpis(Kpis {
            total_voters: 1000,
            votes_cast: 700,
            participation: 70.0,
        }));
        b.apply(BoardUpdate::Parties(vec![party("B", 200), party("A", 500)]));
        b.apply(BoardUpdate::Regions(RegionTable::new(vec![
            region("Lima", Some("A"), 400, 80.5),
            region("Cusco", None, 100, 55.0),
        ])));
        b
    }

    struct FakeFeed {
        calls: AtomicUsize,
        fail_parties: bool,
    }

    impl FakeFeed {
        fn new(fail_parties: bool) -> FakeFeed {
            FakeFeed {
                calls: AtomicUsize::new(0),
                fail_parties,
            }
        }
    }

    impl LiveFeed for FakeFeed {
        fn fetch_kpis(&self) -> DashboardResult<JSValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"totalVotantes": 1000, "votosEmitidos": 632, "participacion": 63.2}))
        }

        fn fetch_party_results(&self) -> DashboardResult<JSValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_parties {
                return Err(DashboardError::Backend {
                    status: 503,
                    message: "Error 503: Service Unavailable".to_string(),
                });
            }
            Ok(json!({"data": [{"partido": "A", "votos": 10}, {"partido": "B", "votos": 30}]}))
        }

        fn fetch_region_participation(&self) -> DashboardResult<JSValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"Lima": {"votos": 25, "porcentaje": 60.0}}))
        }
    }

    #[test]
    fn national_view_sorts_and_sums() {
        let b = board();
        let names: Vec<String> = b.visible_parties().into_iter().map(|p| p.party_name).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(b.total_votes(), 700);
        assert_eq!(b.max_votes(), 500);
        assert_eq!(b.participation_percent(), 70.0);
        assert_eq!(b.party_share(&party("A", 350)), 50.0);
    }

    #[test]
    fn region_view_keeps_national_parties() {
        let mut b = board();
        b.select_region("Lima");
        assert_eq!(b.selection(), &RegionSelection::Region("Lima".to_string()));
        assert_eq!(b.visible_parties().len(), 2);
        assert_eq!(b.total_votes(), 400);
        assert_eq!(b.participation_percent(), 80.5);
        assert_eq!(b.party_share(&party("A", 100)), 25.0);

        b.select_region(NATIONAL);
        assert_eq!(b.selection(), &RegionSelection::National);
        assert_eq!(b.total_votes(), 700);
    }

    #[test]
    fn unknown_region_is_empty() {
        let mut b = board();
        b.select_region("Atlantis");
        assert!(b.visible_parties().is_empty());
        assert_eq!(b.total_votes(), 0);
        assert_eq!(b.max_votes(), 1);
        assert_eq!(b.participation_percent(), 0.0);
        assert_eq!(b.party_share(&party("A", 10)), 0.0);
    }

    #[test]
    fn max_votes_is_at_least_one() {
        let mut b = ResultsBoard::default();
        assert_eq!(b.max_votes(), 1);
        b.apply(BoardUpdate::Parties(vec![party("A", 0), party("B", 0)]));
        assert_eq!(b.max_votes(), 1);
        assert_eq!(b.party_share(&b.parties()[0].clone()), 0.0);
    }

    #[test]
    fn region_options_start_with_national() {
        assert_eq!(board().region_options(), vec!["Nacional", "Lima", "Cusco"]);
        assert_eq!(ResultsBoard::default().region_options(), vec!["Nacional"]);
    }

    #[test]
    fn regions_without_party_take_the_national_leader() {
        let b = board();
        let lima = b.regions().get("Lima").unwrap();
        assert_eq!(b.leading_party(lima), Some(("A", "#16A34A")));
        let cusco = b.regions().get("Cusco").unwrap();
        // First party as reported, with its own color.
        assert_eq!(b.leading_party(cusco), Some(("B", "#2563EB")));
        assert_eq!(ResultsBoard::default().leading_party(cusco), None);
    }

    #[test]
    fn refresh_applies_each_feed_independently() {
        let board = Mutex::new(board());
        refresh(&board, &FakeFeed::new(true));
        let b = board.lock().unwrap();
        assert_eq!(b.kpis().votes_cast, 632);
        assert!(b.parties().is_empty());
        assert_eq!(b.regions().len(), 1);
        assert_eq!(b.regions().get("Lima").unwrap().votes, 25);
        assert!(b.last_update().is_some());
    }

    #[test]
    fn refresh_normalizes_the_envelope() {
        let board = Mutex::new(ResultsBoard::default());
        refresh(&board, &FakeFeed::new(false));
        let b = board.lock().unwrap();
        let names: Vec<String> = b.visible_parties().into_iter().map(|p| p.party_name).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(b.total_votes(), 40);
    }

    #[test]
    fn poller_fetches_immediately_and_stops_on_drop() {
        let board = Arc::new(Mutex::new(ResultsBoard::default()));
        let feed = Arc::new(FakeFeed::new(false));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let r = refreshes.clone();
        let poller = Poller::start(
            board.clone(),
            feed.clone(),
            Duration::from_secs(3600),
            move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            },
        );
        while refreshes.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(poller.is_running());
        drop(poller);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
        assert_eq!(board.lock().unwrap().kpis().total_voters, 1000);
    }

    #[test]
    fn huge_vote_counts_saturate() {
        let mut b = ResultsBoard::default();
        b.apply(BoardUpdate::Parties(normalize::party_results(&json!([
            {"partido": "A", "votos": 1e19},
            {"partido": "B", "votos": 1e19}
        ]))));
        assert_eq!(b.total_votes(), u64::MAX);
        assert_eq!(b.max_votes(), 10_000_000_000_000_000_000);
    }

    #[test]
    fn region_options_skip_blank_and_national_names() {
        let mut b = ResultsBoard::default();
        b.apply(BoardUpdate::Regions(RegionTable::new(vec![
            region("Nacional", None, 1, 1.0),
            region("", None, 1, 1.0),
            region("Piura", None, 1, 1.0),
        ])));
        assert_eq!(b.region_options(), vec!["Nacional", "Piura"]);
    }

    /// Holds the KPI answer back until the other two parts are on the board.
    struct SlowKpisFeed {
        board: Arc<Mutex<ResultsBoard>>,
        saw_others_first: AtomicBool,
    }

    impl LiveFeed for SlowKpisFeed {
        fn fetch_kpis(&self) -> DashboardResult<JSValue> {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                let ready = {
                    let b = self.board.lock().unwrap();
                    !b.parties().is_empty() && !b.regions().is_empty()
                };
                if ready {
                    self.saw_others_first.store(true, Ordering::SeqCst);
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            Ok(json!({"totalVotantes": 10, "votosEmitidos": 5, "participacion": 50.0}))
        }

        fn fetch_party_results(&self) -> DashboardResult<JSValue> {
            Ok(json!([{"partido": "A", "votos": 5}]))
        }

        fn fetch_region_participation(&self) -> DashboardResult<JSValue> {
            Ok(json!([{"label": "Lima", "value": 5}]))
        }
    }

    #[test]
    fn slow_kpis_do_not_hold_back_the_other_parts() {
        let board = Arc::new(Mutex::new(ResultsBoard::default()));
        let feed = SlowKpisFeed {
            board: board.clone(),
            saw_others_first: AtomicBool::new(false),
        };
        refresh(&board, &feed);
        assert!(feed.saw_others_first.load(Ordering::SeqCst));
        assert_eq!(board.lock().unwrap().kpis().votes_cast, 5);
    }
}
