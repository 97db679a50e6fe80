fn main() {
    lidar_pipeline::cli::run();
}
