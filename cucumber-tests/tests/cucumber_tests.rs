use cucumber::World;
use cucumber_tests::features::world::CourierWorld;

#[tokio::main]
async fn main() {
    CourierWorld::cucumber().run_and_exit("features/dispatch/").await;
}
