pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# IAMSHIP SETTINGS
# =============================================================================
# Optional tuning for the GCP IAM audit log shipper. Every key has a default,
# so any section (or the whole file) may be omitted.
#
# Connection details come from the environment, not from this file:
#
#   CREDENTIALS_FILE_CONTENT   Service account JSON (access_token field used)
#   RESOURCE_NAMES             e.g. project/my-proj,service_account/my-proj
#   WORKSPACE_ID               Log Analytics workspace id
#   SHARED_KEY                 Log Analytics primary key (base64)
#   logAnalyticsUri            Optional, https://<id>.ods.opinsights.azure.<tld>
#   GOOGLE_OAUTH_ACCESS_TOKEN  Optional bearer token fallback
#   IAMSHIP_CURSOR_PATH        Optional cursor database location
#
# Values may reference environment variables with $env{VAR_NAME}.
#
# Settings file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/iamship/config.yml
#   3. /etc/iamship/config.yml

# =============================================================================
# PIPELINE SETTINGS
# =============================================================================

pipeline:
  # Resources combined into one Cloud Logging query
  resource_batch_size: 10
  # Entries requested per page (at most 1000)
  page_size: 1000
  # Events buffered before a post to Log Analytics; the cursor advances
  # whenever this buffer is flushed
  queue_size: 3000
  # Window used when no cursor is stored yet
  execution_interval: 5m
  # Oldest point a run will resume from
  max_lookback: 7days
  # Wall-clock budget of a single run
  max_run_duration: 5m
  # Stop starting new work once this share of the budget is spent
  budget_ratio: 0.85

# =============================================================================
# SOURCE SETTINGS
# =============================================================================

source:
  endpoint: https://logging.googleapis.com
  request_timeout: 60s

# =============================================================================
# SINK SETTINGS
# =============================================================================

sink:
  # Custom log table name (letters, digits, underscores)
  log_type: GCP_IAM
  # Largest single post; bigger groups are split
  max_payload_bytes: 26214400
  request_timeout: 60s

# =============================================================================
# CURSOR SETTINGS
# =============================================================================

cursor:
  # DuckDB file holding the last shipped timestamp
  path: ~/.local/share/iamship/cursor.duckdb
"#
    .to_string()
}
