//! Validation behavior of the headless render service. Everything here
//! runs without a browser; Chrome-dependent paths live at the bottom
//! behind #[ignore].

use std::sync::Arc;

use cardshot::content::FALLBACK_ICON;
use cardshot::headless::{validate, CardSpec, HeadlessRenderService, RenderRequest};
use cardshot::theme::ThemeRegistry;
use cardshot::Error;

fn registry() -> ThemeRegistry {
    ThemeRegistry::builtin()
}

fn request(card_count: usize) -> RenderRequest {
    RenderRequest {
        template_id: "classic".into(),
        main_title: "Service Title".into(),
        cards: (0..card_count)
            .map(|i| CardSpec {
                title: format!("Card {}", i),
                desc: "body".into(),
                icon: "bolt".into(),
            })
            .collect(),
        dpr: None,
    }
}

#[test]
fn zero_and_nine_cards_are_rejected_before_launch() {
    let reg = registry();
    for count in [0usize, 9, 12] {
        match validate(&request(count), &reg) {
            Err(Error::Validation(msg)) => assert!(msg.contains("cards length")),
            other => panic!("count {} should fail validation, got {:?}", count, other.is_ok()),
        }
    }
}

#[test]
fn malformed_icon_normalizes_and_request_proceeds() {
    let mut req = request(1);
    req.main_title = "标题".into();
    req.cards[0] = CardSpec {
        title: "A".into(),
        desc: "B".into(),
        icon: "bad icon!".into(),
    };
    let validated = validate(&req, &registry()).expect("icon shape alone never hard-fails");
    assert_eq!(validated.content.cards[0].icon, FALLBACK_ICON);
    assert_eq!(validated.content.main_title, "标题");
}

#[test]
fn omitted_dpr_means_one() {
    let validated = validate(&request(2), &registry()).unwrap();
    assert_eq!(validated.dpr, 1);
}

#[test]
fn empty_fields_fail_with_positional_messages() {
    let mut req = request(2);
    req.cards[1].desc = "   ".into();
    match validate(&req, &registry()) {
        Err(Error::Validation(msg)) => assert!(msg.contains("cards[1].desc")),
        _ => panic!("empty desc must fail validation"),
    }
}

#[test]
fn page_is_built_from_validated_request_only() {
    let service = HeadlessRenderService::new(Arc::new(registry()));
    let validated = validate(&request(4), service.registry()).unwrap();
    let page = service.build_page(&validated).unwrap();
    assert!(page.contains("card-main-title"));
    assert!(page.contains("card-content-wrapper"));
    assert!(page.contains("</script></body></html>"));
}

#[test]
#[ignore] // Requires Chrome to be installed
fn default_dpr_render_is_exactly_1920x1080() {
    let service = HeadlessRenderService::new(Arc::new(registry()));
    let rt = tokio::runtime::Runtime::new().unwrap();
    let png = rt.block_on(service.render(&request(3))).unwrap();
    let img = image::load_from_memory(&png).unwrap();
    assert_eq!((img.width(), img.height()), (1920, 1080));
}

#[test]
#[ignore] // Requires Chrome to be installed
fn teardown_survives_a_forced_load_timeout() {
    // A 1ms load bound forces the timeout path; the per-request process
    // must still be reaped and the error must be timeout-classed.
    let service =
        HeadlessRenderService::new(Arc::new(registry())).with_timeouts(1, 0);
    let rt = tokio::runtime::Runtime::new().unwrap();
    match rt.block_on(service.render(&request(1))) {
        Err(Error::UpstreamTimeout(_)) => {}
        other => panic!("expected UpstreamTimeout, got {:?}", other.map(|b| b.len())),
    }
}
