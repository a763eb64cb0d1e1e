mod facade;
mod helpers;
mod lifecycle;
mod registry;
mod webhooks;
