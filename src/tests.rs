use core::future::Future;

macro_rules! test_suites {
  ($runtime:ident {
    $($name:ident),+$(,)?
  }) => {
    $(
      paste::paste! {
        #[test]
        fn [< $runtime _ $name >]() {
          $crate::tests::[< $runtime _run >]($name::<agnostic_net::runtime::[< $runtime >]::[< $runtime:camel Runtime >]>());
        }
      }
    )*
  }
}

macro_rules! net_test_suites {
  ($runtime:ident {
    $($name:ident),+$(,)?
  }) => {
    $(
      paste::paste! {
        #[test]
        fn [< $runtime _ $name >]() {
          $crate::tests::[< $runtime _run >]($name::<agnostic_net::[< $runtime >]::Net>());
        }
      }
    )*
  }
}

mod server;
mod zone;

/// Initialize the tracing for the unit tests.
pub fn initialize_tests_tracing() {
  use std::sync::Once;
  static TRACE: Once = Once::new();
  TRACE.call_once(|| {
    let filter = std::env::var("MDNS_ZONE_TESTING_LOG").unwrap_or_else(|_| "info".to_owned());
    tracing::subscriber::set_global_default(
      tracing_subscriber::fmt::fmt()
        .without_time()
        .with_line_number(true)
        .with_env_filter(filter)
        .with_file(false)
        .with_target(true)
        .with_ansi(true)
        .finish(),
    )
    .unwrap();
  });
}

fn tokio_run<F>(f: F)
where
  F: Future<Output = ()>,
{
  initialize_tests_tracing();

  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap()
    .block_on(f);
}

fn smol_run<F>(f: F)
where
  F: Future<Output = ()>,
{
  initialize_tests_tracing();
  smol::block_on(f);
}

fn async_std_run<F>(f: F)
where
  F: Future<Output = ()>,
{
  initialize_tests_tracing();
  async_std::task::block_on(f);
}
