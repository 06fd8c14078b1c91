use super::{SinkKind, SyncConfig};

impl SyncConfig {
    /// Applies `HUBSYNC_*` environment overrides on top of file/default values.
    ///
    /// Unparseable numeric or boolean values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("HUBSYNC_HUBSPOT_BASE_URL") {
            self.hubspot.base_url = v;
        }
        if let Some(v) = var("HUBSYNC_ACCOUNTS_DB") {
            self.store.path = v;
        }
        if let Some(v) = var("HUBSYNC_SINK_URL") {
            self.sink.kind = SinkKind::Http;
            self.sink.url = Some(v);
        }
        if let Some(v) = var("HUBSYNC_SINK_TOKEN") {
            self.sink.token = Some(v);
        }
        if let Some(b) = var("HUBSYNC_DRY_RUN").and_then(|v| v.parse::<bool>().ok()) {
            self.dry_run = b;
        }
        if let Some(n) =
            var("HUBSYNC_QUEUE_FLUSH_THRESHOLD").and_then(|v| v.parse::<usize>().ok())
        {
            self.queue.flush_threshold = n;
        }
    }
}
