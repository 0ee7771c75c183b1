use crate::app::App;
use crate::controller::LockState;
use log::info;

/// Beeps while the lock is waiting for input. Only ever reads the lock state.
pub fn run(app: &App) {
    info!("Heartbeat started.");
    while !app.is_shutting_down() {
        if app.state() == LockState::Active {
            app.pulse(&app.tones().heartbeat);
            app.wait(app.timing().heartbeat_interval());
        } else {
            app.wait(app.timing().idle());
        }
    }
    info!("Heartbeat stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::with_app;
    use std::thread;
    use std::time::Duration;

    const HEARTBEAT_HZ: u32 = 2489;

    #[test]
    fn beeps_only_while_active() {
        with_app(|app, out| {
            assert!(app.execute_pending());

            thread::scope(|s| {
                s.spawn(|| run(app));
                thread::sleep(Duration::from_millis(70));

                // Run the alarm but leave the way back to ACTIVE pending, so the lock stays out
                // of ACTIVE.
                for key in "9999".chars() {
                    app.handle_key(key);
                }
                assert!(app.execute_pending());
                assert_eq!(app.state(), LockState::WrongPassword);
                thread::sleep(Duration::from_millis(40));
                let beeps = out.buzzer.count_of(HEARTBEAT_HZ);
                assert!(beeps >= 2, "only {} beeps", beeps);

                thread::sleep(Duration::from_millis(60));
                assert_eq!(out.buzzer.count_of(HEARTBEAT_HZ), beeps);
                app.shutdown();
            });

            assert_eq!(app.pending(), Some(LockState::Active));
            assert!(!out.buzzer.is_enabled());
        });
    }
}
