/// Replaces the default panic hook with one that emits the panic message and
/// location through `tracing::error!` before delegating to the previous
/// hook, so panics are captured by whatever log sink the process is using
/// instead of only appearing on a raw stderr write.
pub fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown location".to_string());
        tracing::error!(%location, "{info}");
        previous(info);
    }));
}
