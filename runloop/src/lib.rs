pub mod run_loop;
pub mod ticker;

#[cfg(test)]
mod tests {

    use super::*;
    use std::time::Duration;

    #[test]
    fn it_works() {
        {
            let _interval = run_loop::new_interval()
                .with_cancel_on_drop(true)
                .with_callback(|_| run_loop::stop())
                .and_start_after(Duration::default());

            run_loop::run();
        }

        ticker::run_with_period(Duration::from_millis(1), ticker::stop).unwrap();
    }
}
