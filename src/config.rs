use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};
use crate::portal::{FrameTarget, Locator};

const DECLARATIONS_LOGIN_URL: &str = "https://api-seguridad.sunat.gob.pe/v1/clientessol/59d39217-c025-4de5-b342-393b0f4630ab/oauth2/loginMenuSol?lang=es-PE&showDni=true&showLanguages=false&originalUrl=https://e-menu.sunat.gob.pe/cl-ti-itmenu2/AutenticaMenuInternetPlataforma.htm&state=rO0ABXQA701GcmNEbDZPZ28xODJOWWQ4aTNPT2krWUcrM0pTODAzTEJHTmtLRE1IT2pBQ2l2eW84em5lWjByM3RGY1BLT0tyQjEvdTBRaHNNUW8KWDJRQ0h3WmZJQWZyV0JBaGtTT0hWajVMZEg0Mm5ZdHlrQlFVaDFwMzF1eVl1V2tLS3ozUnVoZ1ovZisrQkZndGdSVzg1TXdRTmRhbAp1ek5OaXdFbG80TkNSK0E2NjZHeG0zNkNaM0NZL0RXa1FZOGNJOWZsYjB5ZXc3MVNaTUpxWURmNGF3dVlDK3pMUHdveHI2cnNIaWc1CkI3SkxDSnc9";
const PAYMENTS_LOGIN_URL: &str = "https://api-seguridad.sunat.gob.pe/v1/clientessol/4f3b88b3-d9d6-402a-b85d-6a0bc857746a/oauth2/loginMenuSol?lang=es-PE&showDni=true&showLanguages=false&originalUrl=https://e-menu.sunat.gob.pe/cl-ti-itmenu/AutenticaMenuInternet.htm&state=rO0ABXNyABFqYXZhLnV0aWwuSGFzaE1hcAUH2sHDFmDRAwACRgAKbG9hZEZhY3RvckkACXRocmVzaG9sZHhwP0AAAAAAAAx3CAAAABAAAAADdAAEZXhlY3B0AAZwYXJhbXN0AEsqJiomL2NsLXRpLWl0bWVudS9NZW51SW50ZXJuZXQuaHRtJmI2NGQyNmE4YjVhZjA5MTkyM2IyM2I2NDA3YTFjMWRiNDFlNzMzYTZ0AANleGVweA==";

/// Portal endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Login page whose menu hosts the declaration query (session 1).
    pub declarations_login_url: String,

    /// Login page whose menu hosts the payment and NPS reports (sessions 2 and 3).
    pub payments_login_url: String,

    /// URL prefix of the authenticated menu, used to verify a login.
    pub menu_host: String,

    /// IANA time zone the portal's "current month" is computed in.
    pub timezone: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            declarations_login_url: DECLARATIONS_LOGIN_URL.to_string(),
            payments_login_url: PAYMENTS_LOGIN_URL.to_string(),
            menu_host: "https://e-menu.sunat.gob.pe".to_string(),
            timezone: "America/Lima".to_string(),
        }
    }
}

impl PortalConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid portal timezone {:?}: {e}", self.timezone))
    }
}

/// Browser launch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,

    /// Chrome/Chromium executable. Searched on the PATH and known locations if unset.
    pub chrome_path: Option<PathBuf>,

    /// Extra command-line flags appended to the defaults.
    pub args: Vec<String>,
}

/// Per-operation bounds. No bound applies to a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wait for the post-login marker.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub page_load: Duration,

    /// Wait for an element to attach.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub element_wait: Duration,

    /// Wait for a frame to attach.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub frame_resolve: Duration,

    /// Interval between polls of frames and elements.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub poll_interval: Duration,

    /// Fixed delay after submitting a query; the result tables give no completion signal.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub submit_settle: Duration,

    /// Fixed delay after opening a detail view.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub detail_settle: Duration,

    /// Wait for listing rows to reappear after a restoration.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub restore_rows: Duration,

    /// Bound on a single restoration strategy.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub back_navigation: Duration,

    /// How long to look for the post-login notice frame.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub popup_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(10),
            element_wait: Duration::from_secs(10),
            frame_resolve: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            submit_settle: Duration::from_secs(2),
            detail_settle: Duration::from_secs(1),
            restore_rows: Duration::from_secs(10),
            back_navigation: Duration::from_secs(5),
            popup_wait: Duration::from_secs(5),
        }
    }
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Cookie jar. If relative, resolved from the config file location.
    pub session_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            session_file: PathBuf::from("session.json"),
        }
    }
}

/// Login form shared by both login pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    pub ruc: Locator,
    pub username: Locator,
    pub secret: Locator,
    pub submit: Locator,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            ruc: Locator::css("#txtRuc"),
            username: Locator::css("#txtUsuario"),
            secret: Locator::css("#txtContrasena"),
            submit: Locator::css("#btnAceptar"),
        }
    }
}

/// The select2 "form type" filter of the declaration query, reapplied per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormFilter {
    /// Chip selecting every form, removed first.
    pub clear_all: Locator,
    pub search_input: Locator,
    /// Typed into the search box and picked from the results.
    pub value: String,
    pub option: Locator,
    /// Clicked afterwards to close the dropdown.
    pub blur: Locator,
}

impl Default for FormFilter {
    fn default() -> Self {
        Self {
            clear_all: Locator::css("#s2id_numFormulario .select2-search-choice-close"),
            search_input: Locator::css("#s2id_numFormulario .select2-input"),
            value: "IGV".to_string(),
            option: Locator::with_text(".select2-results li", "IGV"),
            blur: Locator::css("body"),
        }
    }
}

/// Four selects bounding a query by (month, year) from and to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSelectors {
    pub month_start: Locator,
    pub year_start: Locator,
    pub month_end: Locator,
    pub year_end: Locator,
}

/// Session 1: declaration query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarationSelectors {
    /// Appears once the login landed on the menu.
    pub ready: Locator,
    /// Menu entries clicked in order to open the query application.
    pub menu: Vec<Locator>,
    pub frame: FrameTarget,
    pub form_filter: FormFilter,
    pub range: RangeSelectors,
    pub search: Locator,
    pub result_link: Locator,
    pub total: Locator,
    pub close_detail: Locator,
}

impl Default for DeclarationSelectors {
    fn default() -> Self {
        Self {
            ready: Locator::text("Consultas"),
            menu: vec![
                Locator::text("Consultas"),
                Locator::text("Consultas de Presentación y Pago"),
                Locator::text("Consulta de Declaraciones y Pagos"),
            ],
            frame: FrameTarget::named("iframeApplication")
                .or_url("consultaDeclaracionInternetprincipal"),
            form_filter: FormFilter::default(),
            range: RangeSelectors {
                month_start: Locator::css("#periodo_tributario_1"),
                year_start: Locator::css(
                    "select[ng-model=\"consultaBean.rangoPeriodoTributarioInicioAnio\"]",
                ),
                month_end: Locator::css("#periodo_tributario_2"),
                year_end: Locator::css(
                    "select[ng-model=\"consultaBean.rangoPeriodoTributarioFinAnio\"]",
                ),
            },
            search: Locator::with_text("button", "Buscar"),
            result_link: Locator::css("a[ng-click=\"mostrarDetalle(constancia);\"]"),
            total: Locator::with_text("tr", "Total deuda tributaria")
                .child("td.text-right.ng-binding:last-child"),
            close_detail: Locator::css(".modal button.close, .modal [data-dismiss=\"modal\"]"),
        }
    }
}

/// Session 2 phase A: payment listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSelectors {
    pub ready: Locator,
    /// Frame carrying post-login notices that must be dismissed.
    pub notice_frame: FrameTarget,
    /// Button captions of the notices, clicked in this order while visible.
    pub notice_buttons: Vec<String>,
    pub menu: Vec<Locator>,
    /// Frame hosting the report; `None` means the outer page.
    pub frame: Option<FrameTarget>,
    pub amount_paid: Locator,
    pub amount_paid_value: String,
    pub range: RangeSelectors,
    pub search: Locator,
    pub table: Locator,
    pub first_row: Locator,
    pub date_column: usize,
    pub amount_column: usize,
}

impl Default for PaymentSelectors {
    fn default() -> Self {
        Self {
            ready: Locator::text("Mis declaraciones informativas"),
            notice_frame: FrameTarget::named("ifrVCE"),
            notice_buttons: vec![
                "Finalizar".to_string(),
                "Continuar sin confirmar".to_string(),
                "Continuar".to_string(),
            ],
            menu: vec![
                Locator::text("Mis declaraciones informativas"),
                Locator::css("#nivel2_12_8"),
                Locator::css("#nivel3_12_8_1"),
                Locator::css("#nivel4_12_8_1_1_2"),
            ],
            frame: Some(FrameTarget::named("iframeApplication")),
            amount_paid: Locator::css("select[name=\"importepagado\"]"),
            amount_paid_value: "2".to_string(),
            range: RangeSelectors {
                month_start: Locator::css("select[name=\"mdesde\"]"),
                year_start: Locator::css("select[name=\"adesde\"]"),
                month_end: Locator::css("select[name=\"mhasta\"]"),
                year_end: Locator::css("select[name=\"ahasta\"]"),
            },
            search: Locator::with_text("button, input[type=\"button\"]", "Buscar"),
            table: Locator::css("table.table"),
            first_row: Locator::css("table.table tbody tr"),
            date_column: 3,
            amount_column: 5,
        }
    }
}

/// Session 2 phase B: NPS listing and its detail pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NpsSelectors {
    /// Returns the menu to its start page.
    pub home: Locator,
    pub menu: Vec<Locator>,
    pub frame: FrameTarget,
    pub rows: Locator,
    /// Text that identifies the listing table among the frame's tables.
    pub signature: String,
    /// Header text of the amount column, required when re-locating the listing.
    pub amount_header: String,
    pub number_column: usize,
    pub date_column: usize,
    pub amount_column: usize,
    /// Appears once a detail view rendered.
    pub detail_ready: Locator,
}

impl Default for NpsSelectors {
    fn default() -> Self {
        Self {
            home: Locator::css("button.aOpcionInicio"),
            menu: vec![
                Locator::text("Mis declaraciones informativas"),
                Locator::text("Presento mis declaraciones y pagos"),
                Locator::text("Declarativas"),
                Locator::text("Consulta de NPS"),
            ],
            frame: FrameTarget::named("iframeApplication"),
            rows: Locator::css("table tr td"),
            signature: "NPS".to_string(),
            amount_header: "Importe".to_string(),
            number_column: 0,
            date_column: 2,
            amount_column: 4,
            detail_ready: Locator::css("table td"),
        }
    }
}

/// Every site-specific locator the pipeline uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub login: LoginSelectors,
    pub declarations: DeclarationSelectors,
    pub payments: PaymentSelectors,
    pub nps: NpsSelectors,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub portal: PortalConfig,
    pub browser: BrowserSettings,
    pub timeouts: Timeouts,
    pub paths: PathsConfig,
    pub selectors: Selectors,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the cookie jar path against `config_dir` when it is relative.
    pub fn resolve_session_file(&self, config_dir: &Path) -> PathBuf {
        let session_file = &self.paths.session_file;
        if session_file.is_absolute() {
            session_file.clone()
        } else {
            config_dir.join(session_file)
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub portal: PortalConfig,
    pub browser: BrowserSettings,
    pub timeouts: Timeouts,
    pub selectors: Selectors,

    /// The resolved cookie jar path.
    pub session_file: PathBuf,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./sunatsync.toml` if it exists in current directory
/// 2. `~/.local/share/sunatsync/sunatsync.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("sunatsync.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("sunatsync").join("sunatsync.toml");
    }

    local_config
}

impl ResolvedConfig {
    fn from_config(config: Config, config_dir: &Path) -> Self {
        let session_file = config.resolve_session_file(config_dir);
        Self {
            portal: config.portal,
            browser: config.browser,
            timeouts: config.timeouts,
            selectors: config.selectors,
            session_file,
        }
    }

    /// Load and resolve config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Relative paths are then resolved against the directory the config file
    /// would live in.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(Config::default(), config_dir))
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_config(Config::default(), Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_timeouts() {
        let config = Config::default();
        assert_eq!(config.timeouts.element_wait, Duration::from_secs(10));
        assert_eq!(config.timeouts.poll_interval, Duration::from_millis(250));
        assert_eq!(config.portal.tz().unwrap(), chrono_tz::America::Lima);
    }

    #[test]
    fn test_load_empty_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("sunatsync.toml");
        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.paths.session_file, PathBuf::from("session.json"));
        assert_eq!(config.selectors.nps.signature, "NPS");
        assert_eq!(config.selectors.declarations.menu.len(), 3);

        Ok(())
    }

    #[test]
    fn test_load_timeouts_and_selectors() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("sunatsync.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[timeouts]")?;
        writeln!(file, "element_wait = \"3s\"")?;
        writeln!(file, "poll_interval = \"100ms\"")?;
        writeln!(file, "[selectors.payments]")?;
        writeln!(file, "date_column = 1")?;
        writeln!(file, "amount_column = 2")?;
        writeln!(file, "[selectors.nps.frame]")?;
        writeln!(file, "url_contains = \"consultaNps\"")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.timeouts.element_wait, Duration::from_secs(3));
        assert_eq!(config.timeouts.poll_interval, Duration::from_millis(100));
        // Untouched fields keep their defaults.
        assert_eq!(config.timeouts.page_load, Duration::from_secs(10));
        assert_eq!(config.selectors.payments.date_column, 1);
        assert_eq!(config.selectors.payments.amount_column, 2);
        assert_eq!(config.selectors.payments.amount_paid_value, "2");
        assert_eq!(config.selectors.nps.frame.name, None);
        assert_eq!(
            config.selectors.nps.frame.url_contains.as_deref(),
            Some("consultaNps")
        );

        Ok(())
    }

    #[test]
    fn test_invalid_duration_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("sunatsync.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[timeouts]")?;
        writeln!(file, "element_wait = \"soon\"")?;

        assert!(Config::load(&config_path).is_err());
        Ok(())
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let portal = PortalConfig {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(portal.tz().is_err());
    }

    #[test]
    fn test_resolved_config_resolves_relative_session_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("sunatsync.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[paths]")?;
        writeln!(file, "session_file = \"state/cookies.json\"")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(
            resolved.session_file,
            dir.path().canonicalize()?.join("state/cookies.json")
        );

        Ok(())
    }

    #[test]
    fn test_resolved_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("sunatsync.toml");

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.session_file, dir.path().join("session.json"));

        Ok(())
    }

    #[test]
    fn test_config_roundtrips_through_toml() -> Result<()> {
        let rendered = toml::to_string(&Config::default())?;
        let parsed: Config = toml::from_str(&rendered)?;
        assert_eq!(parsed.timeouts.submit_settle, Duration::from_secs(2));
        assert_eq!(
            parsed.selectors.declarations.total,
            Config::default().selectors.declarations.total
        );
        Ok(())
    }
}
