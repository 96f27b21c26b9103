/// The running binary's basename with any extension stripped, used as the
/// default tracing target/log file stem.
pub fn app_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(|p| std::path::Path::new(p).file_name().map(|n| n.to_string_lossy().into_owned()))
        .flatten()
        .map(|name| name.split('.').next().unwrap_or(&name).to_string())
        .unwrap_or_else(|| "hls-dl".to_string())
}
