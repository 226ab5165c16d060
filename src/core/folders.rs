use once_cell::sync::Lazy;
use std::sync::Arc;

pub static HOME_DIR: Lazy<Arc<str>> = Lazy::new(|| {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USER").map(|user| format!("/home/{}", user)))
        .map(Arc::from)
        .unwrap_or_else(|_| Arc::from("."))
});

pub static CONFIG_DIR: Lazy<Arc<str>> = Lazy::new(|| {
    let base = std::env::var("XDG_CONFIG_HOME")
        .unwrap_or_else(|_| format!("{}/.config", HOME_DIR.as_ref()));
    Arc::from(format!("{}/facepuppet", base))
});

pub static AVATAR_DIR: Lazy<Arc<str>> =
    Lazy::new(|| Arc::from(format!("{}/avatars", CONFIG_DIR.as_ref())));
