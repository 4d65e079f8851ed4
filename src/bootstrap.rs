//! Session bootstrap: open the chat client and wait for login

use crate::config::Config;
use crate::dom::ChatDom;
use crate::error::{Error, Result};
use crate::page::PageAccessor;
use crate::scheduler::PeriodicTask;
use tracing::{debug, info, warn};

/// Bring the page to an authenticated, steady state.
///
/// While waiting for the contact list, the login QR payload is logged on
/// its own timer so an operator can scan it. The QR timer is stopped
/// whether or not login succeeds.
pub async fn bootstrap<P, D>(page: &P, dom: D, config: &Config) -> Result<()>
where
    P: PageAccessor + ?Sized,
    D: ChatDom + Clone + 'static,
{
    page.navigate(&config.chat_url).await?;
    info!(url = %config.chat_url, "chat client opened");

    match page
        .wait_for_selector(&config.selectors.qr_code, config.qr_wait())
        .await
    {
        Ok(()) => info!("login QR code displayed"),
        Err(e) if e.is_timeout() => {
            warn!("no QR code shown, session may already be logged in")
        }
        Err(e) => return Err(e),
    }

    let qr_task = PeriodicTask::spawn("qr-display", config.qr_interval(), move || {
        let dom = dom.clone();
        async move {
            display_qr(&dom).await;
        }
    });

    let logged_in = page
        .wait_for_selector(&config.selectors.contact_row, config.login_wait())
        .await;
    qr_task.shutdown().await;

    match logged_in {
        Ok(()) => {
            info!("session ready");
            Ok(())
        }
        Err(e) if e.is_timeout() => Err(Error::Session(format!(
            "contact list did not appear within {}s",
            config.login_wait().as_secs()
        ))),
        Err(e) => Err(e),
    }
}

/// Log the current QR payload, if any
async fn display_qr<D: ChatDom + ?Sized>(dom: &D) {
    match dom.qr_payload().await {
        Ok(Some(payload)) => info!(qr = %payload, "scan QR code to log in"),
        Ok(None) => debug!("no QR code on page"),
        Err(e) => warn!(error = %e, "failed to read QR code"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Action, FakeChat};
    use std::time::Duration;

    #[tokio::test]
    async fn test_already_logged_in() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        let config = Config::for_test();

        bootstrap(&chat, chat.clone(), &config).await.unwrap();
        assert_eq!(chat.actions(), vec![Action::Navigate(config.chat_url.clone())]);
    }

    #[tokio::test]
    async fn test_login_never_completes() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.set_logged_in(false);
        chat.set_qr(Some("2@abc,def"));

        let result = bootstrap(&chat, chat.clone(), &Config::for_test()).await;
        assert!(matches!(result, Err(Error::Session(_))));
    }

    #[tokio::test]
    async fn test_display_qr_reads_payload() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.set_qr(Some("2@abc,def"));

        display_qr(&chat).await;
        assert_eq!(chat.qr_reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qr_logged_while_waiting() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.set_logged_in(false);
        chat.set_qr(Some("2@abc,def"));
        let config = Config {
            qr_interval_ms: 50,
            login_wait_ms: 10_000,
            ..Config::for_test()
        };

        let scan = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let reads = chat.qr_reads();
            chat.set_qr(None);
            chat.set_logged_in(true);
            reads
        };
        let (result, reads_while_waiting) =
            tokio::join!(bootstrap(&chat, chat.clone(), &config), scan);
        result.unwrap();
        assert!(reads_while_waiting >= 4);

        // The QR timer stops once login is seen
        let reads = chat.qr_reads();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(chat.qr_reads(), reads);
    }
}
