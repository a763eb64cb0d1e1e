mod broadcast;
mod cache;
mod config;
mod content;
mod events;
mod identity;
mod messages;
mod qr;
mod retry;
mod webhook_config;
