pub mod api;
pub mod core;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("slide_lib"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // RUST_LOG 覆盖默认级别；重复初始化时静默忽略
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
