mod event_loop;
mod power;
