use std::io::Write;

/// 日志级别的环境变量，语法与 `RUST_LOG` 一致
pub const LOG_ENV: &str = "HYBRID_LOG";

/// 以 info 级别初始化日志，可以通过 [`LOG_ENV`] 覆盖
///
/// 重复调用是安全的（例如多个测试都调用），只有第一次生效
pub fn init_log() {
    init_log_with(log::LevelFilter::Info);
}

pub fn init_log_with(default_level: log::LevelFilter) {
    let result = env_logger::Builder::new()
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let black_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(75, 75, 75))));

            let line = record.line().unwrap_or(!0);
            let file = short_file_name(record.file().unwrap_or(""));
            let time = chrono::Local::now().format("%H:%M:%S");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} \
                 {black_style}{}{black_style:#}",
                record.args()
            )
        })
        .filter(None, default_level)
        .parse_env(LOG_ENV)
        .try_init();

    if let Err(e) = result {
        log::debug!("logger already initialized: {e}");
    }
}

/// 只保留文件名，windows 和 unix 的分隔符都需要处理
fn short_file_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_file_name() {
        assert_eq!(short_file_name("engine\\crates\\view.rs"), "view.rs");
        assert_eq!(short_file_name("engine/crates/view.rs"), "view.rs");
        assert_eq!(short_file_name("view.rs"), "view.rs");
        assert_eq!(short_file_name(""), "");
    }

    #[test]
    fn test_init_log_twice() {
        init_log();
        init_log_with(log::LevelFilter::Debug);
        log::info!("logger still usable");
    }
}
