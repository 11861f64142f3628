use std::sync::{Arc, Mutex};

use lumi_inspector::dom::{DomEvent, Document, Page};
use lumi_inspector::locator::{
    classify, ElementKind, Locator, PlaceholderCapture, StrategyBuilder, StrategyKind,
};
use lumi_inspector::recorder::{OverlayState, Picker, PickerState, UiOverlay};

const CATALOG: &str = r#"<html><body>
  <nav><a href="/">Home</a><a href="/shop" id="shop-link">Shop</a></nav>
  <main id="catalog">
    <article data-testid="product-1" class="card">
      <img src="/img/mug.png" alt="Mug">
      <h2>Mug</h2>
      <button class="add" name="add-1">Add to cart</button>
    </article>
    <article data-testid="product-2" class="card">
      <img src="/img/cap.png" alt="Cap">
      <h2>Cap</h2>
      <button class="add" name="add-2">Add to cart</button>
    </article>
    <form><label>Quantity <input type="number" value="1"></label><input type="range" min="0" max="5"></form>
  </main>
</body></html>"#;

#[test]
fn every_candidate_finds_its_element_first() {
    let doc = Document::parse(CATALOG).unwrap();
    let builder = StrategyBuilder::default();

    for node in doc.all_elements() {
        for candidate in builder.build_strategies(&doc, node) {
            let found = candidate.resolve(&doc).unwrap();
            assert_eq!(
                found.first(),
                Some(&node),
                "{} does not lead back to {}",
                candidate.short_repr(),
                doc.describe(node)
            );
        }
    }
}

#[test]
fn strategies_follow_priority_order() {
    let doc = Document::parse(CATALOG).unwrap();
    let shop = doc.get_element_by_id("shop-link").unwrap();
    let kinds: Vec<StrategyKind> = StrategyBuilder::default()
        .build_strategies(&doc, shop)
        .into_iter()
        .map(|c| c.strategy)
        .collect();

    assert_eq!(kinds.first(), Some(&StrategyKind::Id));
    assert_eq!(kinds.get(1), Some(&StrategyKind::Link));

    const ORDER: [StrategyKind; 13] = [
        StrategyKind::Id,
        StrategyKind::Link,
        StrategyKind::Name,
        StrategyKind::Css,
        StrategyKind::CssAttributes,
        StrategyKind::XPathLinkText,
        StrategyKind::XPathImage,
        StrategyKind::XPathAttributes,
        StrategyKind::XPathRelativeId,
        StrategyKind::XPathHref,
        StrategyKind::XPathPosition,
        StrategyKind::XPathInnerText,
        StrategyKind::XPathInputLabel,
    ];
    let ranks: Vec<usize> = kinds
        .iter()
        .map(|k| ORDER.iter().position(|o| o == k).unwrap())
        .collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn classification_of_catalog_controls() {
    let doc = Document::parse(CATALOG).unwrap();
    let kind = |xpath: &str| {
        let node = doc.evaluate_xpath(xpath).unwrap()[0];
        classify(&doc, node).map(|c| c.kind)
    };
    assert_eq!(kind("//a[@id='shop-link']"), Some(ElementKind::Link));
    assert_eq!(kind("(//button)[2]"), Some(ElementKind::Button));
    assert_eq!(kind("//input[@type='number']"), Some(ElementKind::Text));
    assert_eq!(kind("//input[@type='range']"), Some(ElementKind::Range));
    assert_eq!(kind("//h2[1]"), None);
}

#[tokio::test]
async fn picker_hands_out_a_full_locator() {
    let page = Page::from_markup("https://shop.test/catalog", CATALOG).unwrap();
    let overlay = UiOverlay::install(&page).unwrap();
    let picker = Picker::new(
        page.clone(),
        overlay.clone(),
        StrategyBuilder::default(),
        Arc::new(PlaceholderCapture),
    );
    let picked: Arc<Mutex<Option<Locator>>> = Arc::new(Mutex::new(None));
    let sink = picked.clone();
    picker
        .start(Box::new(move |l| *sink.lock().unwrap() = Some(l)), false)
        .unwrap();
    assert_eq!(overlay.state(), OverlayState::Picking);

    let second_add = page.read().evaluate_xpath("(//button)[2]").unwrap()[0];
    picker
        .handle_event(&DomEvent::mouse_move(second_add))
        .await
        .unwrap();
    let outcome = picker
        .handle_event(&DomEvent::click(second_add))
        .await
        .unwrap();
    assert!(outcome.default_prevented);
    assert_eq!(picker.state(), PickerState::Removed);

    let locator = picked.lock().unwrap().take().unwrap();
    assert_eq!(locator.source, "https://shop.test/catalog");
    assert_eq!(locator.element_tag, "BUTTON");
    assert!(locator.screenshot.data_url().starts_with("data:image/png;base64,"));
    assert!(locator
        .alternatives
        .iter()
        .any(|a| a.candidate.strategy == StrategyKind::Name && a.candidate.value == "add-2"));

    let json = serde_json::to_value(&locator).unwrap();
    assert_eq!(json["elementTag"], "BUTTON");
    assert_eq!(json["alternatives"][0]["matches"], 1);
    assert!(page.read().get_element_by_id("inspector-frame").is_none());
}
